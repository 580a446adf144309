//! In-memory metadata service
//!
//! [MemoryClient] keeps every record in process and implements both client
//! traits, answering the way the real service does, including its error
//! shapes. It counts calls per [Operation] and can be told to fail the next
//! call of a given kind, which makes it a convenient stand-in for tests and
//! local development.

use crate::{
    client::{ImageStreamProvisioner, MetadataClient},
    errors::{StatusError, TransportError},
    image::ContentDigest,
    metadata::{
        Image, ImageBlobReferences, ImageLayerData, ImageStream, ImageStreamLayers,
        ImageStreamMapping, LimitRange, LimitRangeList, NamedTagEventList, Secret, SecretList,
        TagEvent,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Kinds of call a [MemoryClient] answers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetImageStream,
    GetImageStreamLayers,
    GetImage,
    CreateImageStreamMapping,
    ListImageStreamSecrets,
    ListLimitRanges,
    CreateImageStream,
}

type StreamKey = (String, String);

fn key(namespace: &str, name: &str) -> StreamKey {
    (namespace.to_owned(), name.to_owned())
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    streams: BTreeMap<StreamKey, ImageStream>,
    layers: BTreeMap<StreamKey, ImageStreamLayers>,
    images: BTreeMap<String, Image>,
    secrets: BTreeMap<StreamKey, Vec<Secret>>,
    limit_ranges: BTreeMap<String, Vec<LimitRange>>,
    mappings: Vec<ImageStreamMapping>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<TransportError>>,
}

impl State {
    /// Count a call, and hand back an injected failure if one is queued
    fn begin(&mut self, op: Operation) -> Result<(), TransportError> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.failures.get_mut(&op).and_then(|queue| queue.pop_front()) {
            Some(err) => {
                log::debug!("memory client: injected failure for {:?}: {}", op, err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn require_namespace(&self, namespace: &str) -> Result<(), TransportError> {
        if self.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(StatusError::not_found("namespaces", namespace).into())
        }
    }

    /// Blob index derived from the images a stream's tags point at
    fn derived_layers(&self, stream: &ImageStream) -> ImageStreamLayers {
        let mut layers = ImageStreamLayers::default();
        layers.metadata = stream.metadata.clone();
        for history in &stream.status.tags {
            for event in &history.items {
                if layers.images.contains_key(&event.image) {
                    continue;
                }
                let refs = match self.images.get(&event.image) {
                    Some(image) => {
                        for layer in &image.docker_image_layers {
                            layers.blobs.insert(
                                layer.name.clone(),
                                ImageLayerData {
                                    size: Some(layer.size),
                                    media_type: layer.media_type.clone(),
                                },
                            );
                        }
                        image.blob_references()
                    }
                    None => ImageBlobReferences {
                        image_missing: true,
                        ..ImageBlobReferences::default()
                    },
                };
                layers.images.insert(event.image.clone(), refs);
            }
        }
        layers
    }
}

/// A metadata service held entirely in memory
///
/// Streams are served by a local registry reachable at the host name given
/// to [MemoryClient::new]; pushed images are recorded with references
/// pointing there.
pub struct MemoryClient {
    registry: String,
    state: Mutex<State>,
}

impl MemoryClient {
    pub fn new(registry: &str) -> Self {
        MemoryClient {
            registry: registry.to_owned(),
            state: Mutex::new(State::default()),
        }
    }

    /// Host name of the local registry
    pub fn registry(&self) -> &str {
        &self.registry
    }

    fn local_repository(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}/{}", self.registry, namespace, name)
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.state.lock().namespaces.insert(namespace.to_owned());
    }

    /// Store a stream, creating its namespace if needed
    ///
    /// The stream's local repository is filled in if it is empty.
    pub fn add_image_stream(&self, mut stream: ImageStream) {
        let namespace = stream.metadata.namespace.clone();
        let name = stream.metadata.name.clone();
        if stream.status.docker_image_repository.is_empty() {
            stream.status.docker_image_repository = self.local_repository(&namespace, &name);
        }
        let mut state = self.state.lock();
        state.namespaces.insert(namespace.clone());
        state.streams.insert(key(&namespace, &name), stream);
    }

    /// Serve this blob index for a stream instead of deriving one
    pub fn set_image_stream_layers(&self, namespace: &str, name: &str, layers: ImageStreamLayers) {
        self.state.lock().layers.insert(key(namespace, name), layers);
    }

    pub fn add_image(&self, image: Image) {
        self.state
            .lock()
            .images
            .insert(image.metadata.name.clone(), image);
    }

    pub fn add_secret(&self, namespace: &str, name: &str, secret: Secret) {
        self.state
            .lock()
            .secrets
            .entry(key(namespace, name))
            .or_default()
            .push(secret);
    }

    pub fn add_limit_range(&self, namespace: &str, limit_range: LimitRange) {
        self.state
            .lock()
            .limit_ranges
            .entry(namespace.to_owned())
            .or_default()
            .push(limit_range);
    }

    /// Fail the next call of kind `op` with `err`
    ///
    /// Failures queue up, one per call.
    pub fn fail_next<E: Into<TransportError>>(&self, op: Operation, err: E) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(err.into());
    }

    /// How many calls of kind `op` were made so far
    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current state of a stored stream
    pub fn image_stream(&self, namespace: &str, name: &str) -> Option<ImageStream> {
        self.state.lock().streams.get(&key(namespace, name)).cloned()
    }

    /// Every mapping created so far, oldest first
    pub fn mappings(&self) -> Vec<ImageStreamMapping> {
        self.state.lock().mappings.clone()
    }
}

#[async_trait]
impl MetadataClient for MemoryClient {
    async fn get_image_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStream, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::GetImageStream)?;
        state
            .streams
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StatusError::not_found("imagestreams", name).into())
    }

    async fn get_image_stream_layers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStreamLayers, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::GetImageStreamLayers)?;
        let stream_key = key(namespace, name);
        if let Some(layers) = state.layers.get(&stream_key) {
            return Ok(layers.clone());
        }
        match state.streams.get(&stream_key) {
            Some(stream) => Ok(state.derived_layers(stream)),
            None => Err(StatusError::not_found("imagestreams", name).into()),
        }
    }

    async fn get_image(&self, digest: &ContentDigest) -> Result<Image, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::GetImage)?;
        state
            .images
            .get(digest.as_str())
            .cloned()
            .ok_or_else(|| StatusError::not_found("images", digest.as_str()).into())
    }

    async fn create_image_stream_mapping(
        &self,
        namespace: &str,
        mapping: &ImageStreamMapping,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::CreateImageStreamMapping)?;
        state.require_namespace(namespace)?;

        let name = mapping.metadata.name.as_str();
        let digest = mapping.image.metadata.name.clone();
        let event = TagEvent {
            created: Utc::now(),
            docker_image_reference: format!("{}@{}", self.local_repository(namespace, name), digest),
            image: digest.clone(),
            generation: 0,
        };

        let stream = state
            .streams
            .get_mut(&key(namespace, name))
            .ok_or_else(|| StatusError::not_found("imagestreammappings", name))?;
        match stream
            .status
            .tags
            .iter_mut()
            .find(|history| history.tag == mapping.tag)
        {
            Some(history) => history.items.insert(0, event),
            None => stream.status.tags.push(NamedTagEventList {
                tag: mapping.tag.clone(),
                items: vec![event],
            }),
        }

        log::debug!(
            "memory client: tagged {} as {}/{}:{}",
            digest,
            namespace,
            name,
            mapping.tag
        );
        state
            .images
            .entry(digest)
            .or_insert_with(|| mapping.image.clone());
        state.mappings.push(mapping.clone());
        Ok(())
    }

    async fn list_image_stream_secrets(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretList, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::ListImageStreamSecrets)?;
        let stream_key = key(namespace, name);
        if !state.streams.contains_key(&stream_key) {
            return Err(StatusError::not_found("imagestreams", name).into());
        }
        Ok(SecretList {
            items: state.secrets.get(&stream_key).cloned().unwrap_or_default(),
        })
    }

    async fn list_limit_ranges(&self, namespace: &str) -> Result<LimitRangeList, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::ListLimitRanges)?;
        Ok(LimitRangeList {
            items: state
                .limit_ranges
                .get(namespace)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ImageStreamProvisioner for MemoryClient {
    async fn create_image_stream(
        &self,
        namespace: &str,
        stream: &ImageStream,
    ) -> Result<ImageStream, TransportError> {
        let mut state = self.state.lock();
        state.begin(Operation::CreateImageStream)?;
        state.require_namespace(namespace)?;

        let name = stream.metadata.name.clone();
        let stream_key = key(namespace, &name);
        if state.streams.contains_key(&stream_key) {
            return Err(StatusError::already_exists("imagestreams", &name).into());
        }

        let mut created = stream.clone();
        created.metadata.namespace = namespace.to_owned();
        created.status.docker_image_repository = self.local_repository(namespace, &name);
        state.streams.insert(stream_key, created.clone());
        log::debug!("memory client: created image stream {}/{}", namespace, name);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    const A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn image(digest: &str) -> Image {
        let mut image = Image::default();
        image.metadata.name = digest.to_owned();
        image
    }

    #[test]
    fn mapping_requires_stream() {
        let client = MemoryClient::new("registry.svc:5000");
        client.add_namespace("team");
        let mapping = ImageStreamMapping {
            metadata: crate::metadata::ObjectMeta {
                name: "app".to_owned(),
                namespace: "team".to_owned(),
                ..Default::default()
            },
            image: image(A),
            tag: "latest".to_owned(),
        };

        let rt = Runtime::new().unwrap();
        let err = rt
            .block_on(client.create_image_stream_mapping("team", &mapping))
            .unwrap_err();
        let status = err.status().unwrap();
        assert_eq!(status.code, 404);
        assert_eq!(status.details_kind(), Some("imagestreammappings"));
        assert_eq!(status.details_name(), Some("app"));

        let err = rt
            .block_on(client.create_image_stream_mapping("nowhere", &mapping))
            .unwrap_err();
        assert_eq!(err.status().unwrap().details_kind(), Some("namespaces"));

        let mut stream = ImageStream::default();
        stream.metadata.name = "app".to_owned();
        rt.block_on(client.create_image_stream("team", &stream))
            .unwrap();
        rt.block_on(client.create_image_stream_mapping("team", &mapping))
            .unwrap();

        let stream = client.image_stream("team", "app").unwrap();
        assert_eq!(stream.status.tags[0].tag, "latest");
        assert_eq!(
            stream.status.tags[0].items[0].docker_image_reference,
            format!("registry.svc:5000/team/app@{}", A)
        );
        assert_eq!(client.calls(Operation::CreateImageStreamMapping), 3);
        assert_eq!(client.mappings().len(), 1);
    }

    #[test]
    fn injected_failures_are_one_shot() {
        let client = MemoryClient::new("registry.svc:5000");
        client.add_image(image(A));
        client.fail_next(
            Operation::GetImage,
            StatusError::forbidden("images", A, "no"),
        );
        let digest = ContentDigest::parse(A).unwrap();

        let rt = Runtime::new().unwrap();
        assert!(rt.block_on(client.get_image(&digest)).unwrap_err().is_forbidden());
        assert_eq!(rt.block_on(client.get_image(&digest)).unwrap().digest(), A);
        assert_eq!(client.calls(Operation::GetImage), 2);
    }

    #[test]
    fn derived_layers_follow_tags() {
        let client = MemoryClient::new("registry.svc:5000");
        let mut img = image(A);
        img.docker_image_layers.push(crate::metadata::ImageLayer {
            name: "sha256:1111111111111111111111111111111111111111111111111111111111111111"
                .to_owned(),
            size: 10,
            media_type: "application/vnd.docker.image.rootfs.diff.tar.gzip".to_owned(),
        });
        client.add_image(img);

        let mut stream = ImageStream::default();
        stream.metadata.namespace = "team".to_owned();
        stream.metadata.name = "app".to_owned();
        stream.status.tags.push(NamedTagEventList {
            tag: "latest".to_owned(),
            items: vec![TagEvent {
                created: Utc::now(),
                docker_image_reference: format!("quay.io/upstream/app@{}", A),
                image: A.to_owned(),
                generation: 1,
            }],
        });
        client.add_image_stream(stream);

        let rt = Runtime::new().unwrap();
        let layers = rt
            .block_on(client.get_image_stream_layers("team", "app"))
            .unwrap();
        assert_eq!(layers.blobs.len(), 1);
        assert_eq!(layers.images[A].layers.len(), 1);
        assert!(!layers.images[A].image_missing);
    }
}
