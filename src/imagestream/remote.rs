use crate::{
    image::ImageReference,
    metadata::{ImageStream, INSECURE_REPOSITORY_ANNOTATION},
};
use std::fmt;

const DEFAULT_REGISTRY: &str = "docker.io";
const DEFAULT_NAMESPACE: &str = "library";

/// A repository outside the local registry that may hold some content
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteRepository {
    pub registry: String,
    pub namespace: String,
    pub name: String,
    /// Whether the content was imported over an insecure connection
    pub insecure: bool,
}

impl fmt::Display for RemoteRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.namespace, self.name)
    }
}

/// Another image stream served by the local registry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageStreamReference {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ImageStreamReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn registry_of(reference: &str, field: &str) -> Option<String> {
    match ImageReference::parse(reference) {
        Ok(parsed) => parsed.registry().map(|r| r.to_owned()),
        Err(err) => {
            log::warn!("unable to parse {} {:?}: {}", field, reference, err);
            None
        }
    }
}

/// Host names the local registry is known by for this stream
///
/// A reference that can't be parsed contributes no name, so content behind
/// it is treated as external.
pub(super) fn local_registry_names(stream: &ImageStream) -> Vec<String> {
    let mut names = Vec::new();
    names.extend(registry_of(
        &stream.status.docker_image_repository,
        "dockerImageRepository",
    ));
    if !stream.status.public_docker_image_repository.is_empty() {
        names.extend(registry_of(
            &stream.status.public_docker_image_repository,
            "publicDockerImageRepository",
        ));
    }
    names
}

/// Does any tag event point somewhere other than this stream on the local
/// registry?
pub(super) fn has_external_references(stream: &ImageStream, namespace: &str, name: &str) -> bool {
    let prefixes: Vec<String> = local_registry_names(stream)
        .iter()
        .map(|registry| format!("{}/{}/{}@", registry, namespace, name))
        .collect();
    stream
        .status
        .tags
        .iter()
        .flat_map(|history| history.items.iter())
        .any(|event| {
            !prefixes
                .iter()
                .any(|prefix| event.docker_image_reference.starts_with(prefix.as_str()))
        })
}

fn tag_is_insecure(stream: &ImageStream, tag: &str) -> bool {
    stream
        .metadata
        .annotations
        .get(INSECURE_REPOSITORY_ANNOTATION)
        .map(|v| v == "true")
        .unwrap_or(false)
        || stream
            .spec
            .tags
            .iter()
            .any(|t| t.name == tag && t.import_policy.insecure)
}

/// Where the given images came from, according to the stream's tag events
///
/// Images imported from other registries become [RemoteRepository] values;
/// images from the local registry become [ImageStreamReference] values.
/// Events whose reference can't be used are skipped. A repository reached
/// through several tags is listed once, and is insecure if any of those tags
/// is.
pub(super) fn remote_repositories_for_images(
    stream: &ImageStream,
    images: &[&str],
) -> (Vec<RemoteRepository>, Vec<ImageStreamReference>) {
    let local_names = local_registry_names(stream);
    let mut repos: Vec<RemoteRepository> = Vec::new();
    let mut isrefs = Vec::new();

    for history in &stream.status.tags {
        for event in &history.items {
            if !images.contains(&event.image.as_str()) {
                continue;
            }
            let reference = match ImageReference::parse(&event.docker_image_reference) {
                Ok(reference) => reference,
                Err(err) => {
                    log::warn!(
                        "skipping tag {} event for {}: {}",
                        history.tag,
                        event.image,
                        err
                    );
                    continue;
                }
            };

            let is_local = reference
                .registry()
                .map(|registry| local_names.iter().any(|local| local == registry))
                .unwrap_or(false);

            if is_local {
                let namespace = match reference.namespace() {
                    Some(namespace) => namespace,
                    None => {
                        log::debug!("skipping local reference without namespace: {}", reference);
                        continue;
                    }
                };
                let isref = ImageStreamReference {
                    namespace: namespace.to_owned(),
                    name: reference.name().to_owned(),
                };
                if !isrefs.contains(&isref) {
                    isrefs.push(isref);
                }
            } else {
                let repo = RemoteRepository {
                    registry: reference.registry().unwrap_or(DEFAULT_REGISTRY).to_owned(),
                    namespace: reference.namespace().unwrap_or(DEFAULT_NAMESPACE).to_owned(),
                    name: reference.name().to_owned(),
                    insecure: tag_is_insecure(stream, &history.tag),
                };
                let existing = repos.iter_mut().find(|known| {
                    known.registry == repo.registry
                        && known.namespace == repo.namespace
                        && known.name == repo.name
                });
                match existing {
                    Some(known) => known.insecure |= repo.insecure,
                    None => repos.push(repo),
                }
            }
        }
    }

    (repos, isrefs)
}
