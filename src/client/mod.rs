//! Transports for talking to the cluster metadata service
//!
//! The registry talks to the service under two identities. A
//! [MetadataClient] acts as the registry itself and may read streams and
//! publish images. An [ImageStreamProvisioner] acts as the user who made the
//! request, and is only ever used to create a missing stream on their behalf.

mod rest;

pub use rest::*;

use crate::{
    errors::TransportError,
    image::ContentDigest,
    metadata::{
        Image, ImageStream, ImageStreamLayers, ImageStreamMapping, LimitRangeList, SecretList,
    },
};
use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Metadata service operations available to the registry's own identity
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn get_image_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStream, TransportError>;

    /// Fetch the blob index of every image registered with a stream
    async fn get_image_stream_layers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStreamLayers, TransportError>;

    async fn get_image(&self, digest: &ContentDigest) -> Result<Image, TransportError>;

    async fn create_image_stream_mapping(
        &self,
        namespace: &str,
        mapping: &ImageStreamMapping,
    ) -> Result<(), TransportError>;

    /// Pull secrets usable for the images of a stream
    async fn list_image_stream_secrets(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretList, TransportError>;

    async fn list_limit_ranges(&self, namespace: &str) -> Result<LimitRangeList, TransportError>;
}

/// Metadata service operations performed as the requesting user
#[async_trait]
pub trait ImageStreamProvisioner: Send + Sync {
    async fn create_image_stream(
        &self,
        namespace: &str,
        stream: &ImageStream,
    ) -> Result<ImageStream, TransportError>;
}

/// Request-scoped settings shared by every call made while serving one
/// repository request
///
/// Cancelling the token makes any call in flight, and every later call,
/// fail with [TransportError::Cancelled].
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    cancel_token: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext::default()
    }

    pub fn with_token(cancel_token: CancellationToken) -> Self {
        RequestContext { cancel_token }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Run a transport call, abandoning it if the request is cancelled first
    pub async fn run<T, F>(&self, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        if self.cancel_token.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(TransportError::Cancelled),
            result = call => result,
        }
    }
}
