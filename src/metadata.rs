//! Records exchanged with the cluster metadata service
//!
//! Partial implementation of the image API group's resource schemas, only the
//! fields this crate reads or writes.

use crate::image::ContentDigest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stream annotation which marks every tag of the stream as insecure
pub const INSECURE_REPOSITORY_ANNOTATION: &str = "openshift.io/image.insecureRepository";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Namespaced, tag-versioned record of imported and pushed images
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStream {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ImageStreamSpec,
    #[serde(default)]
    pub status: ImageStreamStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagReference>,
}

/// Per-tag settings from the stream spec
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    pub name: String,
    #[serde(default)]
    pub import_policy: TagImportPolicy,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagImportPolicy {
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamStatus {
    /// Where the local registry serves this stream, `host/namespace/name`
    #[serde(default)]
    pub docker_image_repository: String,
    /// Where the local registry serves this stream for clients outside the
    /// cluster, if exposed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_docker_image_repository: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<NamedTagEventList>,
}

/// History of a single tag, most recent event first
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedTagEventList {
    pub tag: String,
    #[serde(default)]
    pub items: Vec<TagEvent>,
}

/// One entry of a tag's history
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    pub created: DateTime<Utc>,
    /// Fully-qualified reference recorded when the image was tagged
    pub docker_image_reference: String,
    /// Digest of the image
    pub image: String,
    #[serde(default)]
    pub generation: i64,
}

/// Digest-addressed image metadata
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub docker_image_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_metadata: Option<DockerImageMetadata>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image_manifest_media_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docker_image_layers: Vec<ImageLayer>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DockerImageMetadata {
    /// Digest of the image config blob
    #[serde(default, rename = "Id")]
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayer {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub media_type: String,
}

impl Image {
    /// Digest of this image, which is also its name
    pub fn digest(&self) -> &str {
        &self.metadata.name
    }

    /// Blobs this image is made of: the config blob, if known, and its layers
    /// in order
    pub fn blob_references(&self) -> ImageBlobReferences {
        let config = self
            .docker_image_metadata
            .as_ref()
            .map(|m| m.id.clone())
            .filter(|id| !id.is_empty());
        ImageBlobReferences {
            image_missing: false,
            config,
            layers: self
                .docker_image_layers
                .iter()
                .map(|l| l.name.clone())
                .collect(),
        }
    }
}

/// Index of the blobs referenced by every image of a stream
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamLayers {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub blobs: BTreeMap<String, ImageLayerData>,
    #[serde(default)]
    pub images: BTreeMap<String, ImageBlobReferences>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default)]
    pub media_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlobReferences {
    #[serde(default)]
    pub image_missing: bool,
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl ImageBlobReferences {
    /// Is the blob used as this image's config or one of its layers?
    pub fn has_blob(&self, digest: &ContentDigest) -> bool {
        self.config.as_deref() == Some(digest.as_str())
            || self.layers.iter().any(|layer| digest == layer.as_str())
    }
}

/// Request to publish an image under a tag of a stream
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamMapping {
    pub metadata: ObjectMeta,
    pub image: Image,
    pub tag: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, rename = "type")]
    pub secret_type: String,
    /// Values, base64 encoded as sent by the service
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretList {
    #[serde(default)]
    pub items: Vec<Secret>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRange {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: LimitRangeSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRangeSpec {
    #[serde(default)]
    pub limits: Vec<LimitRangeItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRangeItem {
    #[serde(default, rename = "type")]
    pub limit_type: String,
    /// Resource name to quantity, e.g. `storage` to `1Gi`
    #[serde(default)]
    pub max: BTreeMap<String, String>,
    #[serde(default)]
    pub min: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRangeList {
    #[serde(default)]
    pub items: Vec<LimitRange>,
}
