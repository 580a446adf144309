//! Per-request view of one image stream
//!
//! An [ImageStream] answers every question the registry asks about a
//! repository while serving a single request: which digests belong to it,
//! which tags point at them, and where content imported from elsewhere can be
//! found. Metadata is fetched at most once per instance, so create a fresh
//! instance for every request.

#[cfg(test)] mod tests;

mod getter;
mod remote;

pub use remote::{ImageStreamReference, RemoteRepository};

use crate::{
    cache::ProjectObjectListStore,
    client::{ImageStreamProvisioner, MetadataClient, RequestContext},
    errors::{ErrorCode, ImageStreamError, StatusReason, TransportError},
    history,
    image::ContentDigest,
    metadata::{
        self, Image, ImageStreamLayers, ImageStreamMapping, LimitRangeList, ObjectMeta, Secret,
        TagEvent, INSECURE_REPOSITORY_ANNOTATION,
    },
    quota::is_quota_exceeded,
};
use getter::{CachedImageGetter, CachedImageStreamGetter, GetterCode, GetterError};
use std::{collections::BTreeMap, sync::Arc};

/// Translate a getter failure into one of the public error codes
fn convert_getter_error(err: GetterError, message: String) -> ImageStreamError {
    let code = match err.code() {
        GetterCode::NotFound => ErrorCode::NotFound,
        GetterCode::Forbidden => ErrorCode::Forbidden,
        GetterCode::Unknown => ErrorCode::Unknown,
    };
    ImageStreamError::new(code, message, err)
}

pub struct ImageStream {
    namespace: String,
    name: String,
    registry_client: Arc<dyn MetadataClient>,
    context: RequestContext,
    image_getter: CachedImageGetter,
    stream_getter: CachedImageStreamGetter,
}

impl ImageStream {
    /// Prepare to serve one request for the stream `namespace/name`
    ///
    /// Nothing is fetched until an operation needs it. Every call goes
    /// through `registry_client` and is abandoned if `context` is cancelled.
    pub fn new(
        namespace: &str,
        name: &str,
        registry_client: Arc<dyn MetadataClient>,
        context: RequestContext,
    ) -> Self {
        ImageStream {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            image_getter: CachedImageGetter::new(registry_client.clone(), context.clone()),
            stream_getter: CachedImageStreamGetter::new(
                namespace,
                name,
                registry_client.clone(),
                context.clone(),
            ),
            registry_client,
            context,
        }
    }

    /// `namespace/name`, for diagnostics
    pub fn reference(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A view of another stream sharing this one's client and request
    ///
    /// Nothing fetched by this instance carries over, even when `namespace`
    /// and `name` match this stream's own: the returned instance fetches the
    /// stream and its images again on first use. Keep using `self` to reuse
    /// what it has already fetched.
    pub fn clone_for(&self, namespace: &str, name: &str) -> ImageStream {
        ImageStream::new(
            namespace,
            name,
            self.registry_client.clone(),
            self.context.clone(),
        )
    }

    async fn stream(
        &mut self,
        operation: &str,
    ) -> Result<Arc<metadata::ImageStream>, ImageStreamError> {
        match self.stream_getter.get().await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                let message = format!(
                    "{}: failed to get image stream {}",
                    operation,
                    self.reference()
                );
                Err(convert_getter_error(err, message))
            }
        }
    }

    /// Does the stream exist?
    ///
    /// A stream that isn't there is not an error; failing to find out is.
    pub async fn exists(&mut self) -> Result<bool, ImageStreamError> {
        match self.stream_getter.get().await {
            Ok(_) => Ok(true),
            Err(err) if err.code() == GetterCode::NotFound => Ok(false),
            Err(err) => {
                let message = format!("exists: failed to get image stream {}", self.reference());
                Err(convert_getter_error(err, message))
            }
        }
    }

    /// Find the one tag event recording `digest`
    ///
    /// Fails with [ErrorCode::ImageNotFound] when no tag has ever pointed at
    /// the digest, and with [ErrorCode::Unknown] when it matches more than
    /// one image.
    pub async fn resolve_image_id(
        &mut self,
        digest: &ContentDigest,
    ) -> Result<TagEvent, ImageStreamError> {
        let stream = self.stream("resolve_image_id").await?;
        history::resolve_image_id(&stream, digest.as_str()).map_err(|err| {
            let code = if err.reason() == StatusReason::NotFound {
                ErrorCode::ImageNotFound
            } else {
                ErrorCode::Unknown
            };
            ImageStreamError::new(
                code,
                format!(
                    "resolve_image_id: unable to resolve image id {} in image stream {}",
                    digest,
                    self.reference()
                ),
                err,
            )
        })
    }

    async fn image(&mut self, digest: &ContentDigest) -> Result<Arc<Image>, ImageStreamError> {
        match self.image_getter.get(digest).await {
            Ok(image) => Ok(image),
            Err(err) => {
                let (code, verb) = if err.is_not_found() {
                    (ErrorCode::ImageNotFound, "find")
                } else {
                    (ErrorCode::Unknown, "get")
                };
                let message = format!(
                    "get_image: unable to {} image digest {} in {}",
                    verb, digest, self.name
                );
                Err(ImageStreamError::new(code, message, err))
            }
        }
    }

    /// Fetch an image of this stream, as it was tagged
    ///
    /// The image must be recorded in the stream's tag history. Its
    /// `docker_image_reference` is replaced with the reference recorded by
    /// the tag event, naming the place the image was imported from. The
    /// returned value is a copy and never reflects later fetches.
    pub async fn get_image_of_image_stream(
        &mut self,
        digest: &ContentDigest,
    ) -> Result<Image, ImageStreamError> {
        let event = self.resolve_image_id(digest).await?;
        let stored = self.image(digest).await?;
        let mut image = Image::clone(&stored);
        image.docker_image_reference = event.docker_image_reference;
        Ok(image)
    }

    /// Pull secrets available to this stream's images
    pub async fn get_secrets(&self) -> Result<Vec<Secret>, ImageStreamError> {
        self.context
            .run(
                self.registry_client
                    .list_image_stream_secrets(&self.namespace, &self.name),
            )
            .await
            .map(|list| list.items)
            .map_err(|err| {
                ImageStreamError::new(
                    ErrorCode::Unknown,
                    format!(
                        "get_secrets: error getting secrets for repository {}",
                        self.reference()
                    ),
                    err,
                )
            })
    }

    /// Should content for `tag` be fetched over an insecure connection?
    ///
    /// With no tag, the tag most recently pointed at `digest` is used.
    pub async fn tag_is_insecure(
        &mut self,
        tag: Option<&str>,
        digest: &ContentDigest,
    ) -> Result<bool, ImageStreamError> {
        let stream = self.stream("tag_is_insecure").await?;

        if stream
            .metadata
            .annotations
            .get(INSECURE_REPOSITORY_ANNOTATION)
            .map(String::as_str)
            == Some("true")
        {
            return Ok(true);
        }

        let tag = match tag.filter(|t| !t.is_empty()) {
            Some(tag) => Some(tag),
            None => history::latest_image_tag_event(&stream, digest.as_str()).map(|(tag, _)| tag),
        };

        Ok(match tag {
            None => false,
            Some(tag) => stream
                .spec
                .tags
                .iter()
                .find(|t| t.name == tag)
                .map(|t| t.import_policy.insecure)
                .unwrap_or(false),
        })
    }

    /// Current digest of every tag
    ///
    /// Tags with no history are left out, as are tags whose current image
    /// isn't a valid digest.
    pub async fn tags(&mut self) -> Result<BTreeMap<String, ContentDigest>, ImageStreamError> {
        let stream = self.stream("tags").await?;
        let mut tags = BTreeMap::new();
        for history in &stream.status.tags {
            let event = match history.items.first() {
                Some(event) => event,
                None => continue,
            };
            match ContentDigest::parse(&event.image) {
                Ok(digest) => {
                    tags.insert(history.tag.clone(), digest);
                }
                Err(err) => {
                    log::error!("bad digest {:?} for tag {}: {}", event.image, history.tag, err);
                }
            }
        }
        Ok(tags)
    }

    /// Is `digest` a blob or manifest of any image known to this stream?
    ///
    /// Also returns the stream's blob index when it could be fetched, and
    /// the image itself when `digest` names one. Failing to look is the same
    /// as not finding it.
    pub async fn has_blob(
        &mut self,
        digest: &ContentDigest,
    ) -> (bool, Option<Arc<ImageStreamLayers>>, Option<Arc<Image>>) {
        let layers = match self.stream_getter.layers().await {
            Ok(layers) => layers,
            Err(err) => {
                log::debug!(
                    "has_blob: unable to get image stream layers {}: {}",
                    self.reference(),
                    err
                );
                return (false, None, None);
            }
        };

        if layers.blobs.contains_key(digest.as_str())
            || layers.images.values().any(|refs| refs.has_blob(digest))
        {
            return (true, Some(layers), None);
        }

        if !layers.images.contains_key(digest.as_str()) {
            return (false, Some(layers), None);
        }

        match self.image_getter.get(digest).await {
            Ok(image) => (true, Some(layers), Some(image)),
            Err(err) => {
                log::debug!(
                    "has_blob: image {} is in the index of {} but can't be fetched: {}",
                    digest,
                    self.reference(),
                    err
                );
                (true, Some(layers), None)
            }
        }
    }

    /// Repositories this stream imported from that may hold the blob
    ///
    /// A repository is assumed to hold a blob if one of its manifests uses
    /// it. Repositories served by the local registry are returned as stream
    /// references instead.
    pub async fn remote_repositories_for_blob(
        &mut self,
        digest: &ContentDigest,
    ) -> Result<(Vec<RemoteRepository>, Vec<ImageStreamReference>), ImageStreamError> {
        let stream = self.stream("remote_repositories_for_blob").await?;

        if !remote::has_external_references(&stream, &self.namespace, &self.name) {
            return Ok((Vec::new(), Vec::new()));
        }

        let layers = match self.stream_getter.layers().await {
            Ok(layers) => layers,
            Err(err) => {
                let message = format!(
                    "remote_repositories_for_blob: failed to get image stream layers {}",
                    self.reference()
                );
                return Err(convert_getter_error(err, message));
            }
        };

        let images: Vec<&str> = layers
            .images
            .iter()
            .filter(|(_, refs)| refs.has_blob(digest))
            .map(|(image, _)| image.as_str())
            .collect();

        if images.is_empty() {
            log::debug!(
                "remote_repositories_for_blob: no images found in {} with blob {}",
                self.reference(),
                digest
            );
            return Ok((Vec::new(), Vec::new()));
        }

        let (repos, isrefs) = remote::remote_repositories_for_images(&stream, &images);
        log::debug!(
            "remote_repositories_for_blob: {} blob {}: repos={:?} isrefs={:?}",
            self.reference(),
            digest,
            repos,
            isrefs
        );
        Ok((repos, isrefs))
    }

    /// Repositories this stream imported from that may hold the manifest
    pub async fn remote_repositories_for_manifest(
        &mut self,
        digest: &ContentDigest,
    ) -> Result<(Vec<RemoteRepository>, Vec<ImageStreamReference>), ImageStreamError> {
        let stream = self.stream("remote_repositories_for_manifest").await?;
        let (repos, isrefs) = remote::remote_repositories_for_images(&stream, &[digest.as_str()]);
        log::debug!(
            "remote_repositories_for_manifest: {} manifest {}: repos={:?} isrefs={:?}",
            self.reference(),
            digest,
            repos,
            isrefs
        );
        Ok((repos, isrefs))
    }

    /// Limit ranges of the stream's namespace
    ///
    /// When a cache is given, it is consulted first and filled after a
    /// fetch. A cache that won't take the list only costs a log message.
    pub async fn get_limit_range_list(
        &self,
        cache: Option<&dyn ProjectObjectListStore<LimitRangeList>>,
    ) -> Result<Arc<LimitRangeList>, ImageStreamError> {
        if let Some(cached) = cache.and_then(|cache| cache.get(&self.namespace)) {
            return Ok(cached);
        }

        log::debug!("listing limit ranges in namespace {}", self.namespace);

        let list = self
            .context
            .run(self.registry_client.list_limit_ranges(&self.namespace))
            .await
            .map(Arc::new)
            .map_err(|err| {
                ImageStreamError::new(
                    ErrorCode::Unknown,
                    format!(
                        "get_limit_range_list: failed to list limit ranges for {}",
                        self.reference()
                    ),
                    err,
                )
            })?;

        if let Some(cache) = cache {
            if let Err(err) = cache.add(&self.namespace, list.clone()) {
                log::error!("get_limit_range_list: failed to cache limit range list: {}", err);
            }
        }

        Ok(list)
    }

    async fn publish(&self, mapping: &ImageStreamMapping) -> Result<(), TransportError> {
        self.context
            .run(
                self.registry_client
                    .create_image_stream_mapping(&self.namespace, mapping),
            )
            .await
    }

    /// Decide whether a failed publish means the stream doesn't exist yet
    ///
    /// Only a not-found naming this stream's mapping qualifies; every other
    /// failure is returned as the error the publish ends with.
    fn check_stream_missing(&self, err: TransportError) -> Result<(), ImageStreamError> {
        if is_quota_exceeded(&err) {
            return Err(ImageStreamError::new(
                ErrorCode::Forbidden,
                format!(
                    "create_image_stream_mapping: quota exceeded during creation of {} image stream mapping",
                    self.reference()
                ),
                err,
            ));
        }

        let status = match err.status() {
            Some(status) => status,
            None => {
                return Err(ImageStreamError::new(
                    ErrorCode::Unknown,
                    format!(
                        "create_image_stream_mapping: error creating {} image stream mapping",
                        self.reference()
                    ),
                    err,
                ))
            }
        };

        let kind = status.details_kind().map(str::to_lowercase);
        if err.is_not_found() && kind.as_deref() == Some("namespaces") {
            return Err(ImageStreamError::new(
                ErrorCode::Forbidden,
                format!(
                    "create_image_stream_mapping: namespace of {} is not available",
                    self.reference()
                ),
                err,
            ));
        }

        if status.details_kind() != Some("imagestreammappings")
            || status.code != http::StatusCode::NOT_FOUND.as_u16()
            || status.details_name() != Some(self.name.as_str())
        {
            return Err(ImageStreamError::new(
                ErrorCode::Unknown,
                format!(
                    "create_image_stream_mapping: error creating {} image stream mapping",
                    self.reference()
                ),
                err,
            ));
        }

        Ok(())
    }

    /// Create the missing stream as the requesting user
    ///
    /// Returns the stream as it is now known to exist.
    async fn provision(
        &self,
        user_client: &dyn ImageStreamProvisioner,
    ) -> Result<metadata::ImageStream, ImageStreamError> {
        let mut stream = metadata::ImageStream::default();
        stream.metadata.name = self.name.clone();

        let result = self
            .context
            .run(user_client.create_image_stream(&self.namespace, &stream))
            .await;

        match result {
            Ok(created) => Ok(created),
            Err(err) if err.is_already_exists() || err.is_conflict() => {
                log::debug!("image stream {} was created concurrently", self.reference());
                stream.metadata = ObjectMeta {
                    name: self.name.clone(),
                    namespace: self.namespace.clone(),
                    ..ObjectMeta::default()
                };
                Ok(stream)
            }
            Err(err) if err.is_forbidden() || err.is_unauthorized() || is_quota_exceeded(&err) => {
                Err(ImageStreamError::new(
                    ErrorCode::Forbidden,
                    format!(
                        "create_image_stream_mapping: denied creating image stream {}",
                        self.reference()
                    ),
                    err,
                ))
            }
            Err(err) => Err(ImageStreamError::new(
                ErrorCode::Unknown,
                format!(
                    "create_image_stream_mapping: error auto provisioning image stream {}",
                    self.reference()
                ),
                err,
            )),
        }
    }

    /// Publish `image` under `tag`
    ///
    /// If the stream doesn't exist yet it is created once, as the user behind
    /// `user_client`, and the publish is retried once. Exceeding a quota
    /// fails with [ErrorCode::Forbidden] and is never retried.
    pub async fn create_image_stream_mapping(
        &mut self,
        user_client: &dyn ImageStreamProvisioner,
        tag: &str,
        image: &Image,
    ) -> Result<(), ImageStreamError> {
        let mapping = ImageStreamMapping {
            metadata: ObjectMeta {
                name: self.name.clone(),
                namespace: self.namespace.clone(),
                ..ObjectMeta::default()
            },
            image: image.clone(),
            tag: tag.to_owned(),
        };

        let err = match self.publish(&mapping).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        self.check_stream_missing(err)?;

        let stream = self.provision(user_client).await?;
        log::debug!("cache image stream {}", self.reference());
        self.stream_getter.cache_image_stream(stream);

        match self.publish(&mapping).await {
            Ok(()) => Ok(()),
            Err(err) if is_quota_exceeded(&err) => Err(ImageStreamError::new(
                ErrorCode::Forbidden,
                format!(
                    "create_image_stream_mapping: quota exceeded during creation of {} image stream mapping second time",
                    self.reference()
                ),
                err,
            )),
            Err(err) => Err(ImageStreamError::new(
                ErrorCode::Unknown,
                format!(
                    "create_image_stream_mapping: error creating {} image stream mapping second time",
                    self.reference()
                ),
                err,
            )),
        }
    }
}
