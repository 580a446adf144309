use crate::{
    client::{MetadataClient, RequestContext},
    errors::TransportError,
    image::ContentDigest,
    metadata::{Image, ImageStream, ImageStreamLayers},
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// Outcome classes of an image stream fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum GetterCode {
    NotFound,
    Forbidden,
    Unknown,
}

#[derive(Error, Clone, Debug)]
#[error("{message}")]
pub(super) struct GetterError {
    code: GetterCode,
    message: String,
    #[source]
    source: TransportError,
}

impl GetterError {
    fn new(source: TransportError, what: &str, namespace: &str, name: &str) -> Self {
        let (code, verb) = if source.is_not_found() {
            (GetterCode::NotFound, "not found")
        } else if source.is_forbidden() {
            (GetterCode::Forbidden, "access denied")
        } else {
            (GetterCode::Unknown, "unable to get")
        };
        GetterError {
            code,
            message: format!("{}: {} {}/{}", verb, what, namespace, name),
            source,
        }
    }

    pub(super) fn code(&self) -> GetterCode {
        self.code
    }
}

/// A value fetched at most once per request
enum Memo<T> {
    Unfetched,
    Ready(Arc<T>),
    Failed(GetterError),
}

impl<T> Memo<T> {
    fn cached(&self) -> Option<Result<Arc<T>, GetterError>> {
        match self {
            Memo::Unfetched => None,
            Memo::Ready(value) => Some(Ok(value.clone())),
            Memo::Failed(err) => Some(Err(err.clone())),
        }
    }

    /// Remember a fetch outcome, unless the fetch was cancelled
    fn settle(
        &mut self,
        result: Result<T, TransportError>,
        what: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Arc<T>, GetterError> {
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                *self = Memo::Ready(value.clone());
                Ok(value)
            }
            Err(err) => {
                let cancelled = err.is_cancelled();
                let err = GetterError::new(err, what, namespace, name);
                if !cancelled {
                    *self = Memo::Failed(err.clone());
                }
                Err(err)
            }
        }
    }
}

/// Fetches an image stream and its blob index, each at most once
pub(super) struct CachedImageStreamGetter {
    namespace: String,
    name: String,
    client: Arc<dyn MetadataClient>,
    context: RequestContext,
    stream: Memo<ImageStream>,
    layers: Memo<ImageStreamLayers>,
}

impl CachedImageStreamGetter {
    pub(super) fn new(
        namespace: &str,
        name: &str,
        client: Arc<dyn MetadataClient>,
        context: RequestContext,
    ) -> Self {
        CachedImageStreamGetter {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            client,
            context,
            stream: Memo::Unfetched,
            layers: Memo::Unfetched,
        }
    }

    pub(super) async fn get(&mut self) -> Result<Arc<ImageStream>, GetterError> {
        if let Some(cached) = self.stream.cached() {
            return cached;
        }
        let result = self
            .context
            .run(self.client.get_image_stream(&self.namespace, &self.name))
            .await;
        self.stream
            .settle(result, "image stream", &self.namespace, &self.name)
    }

    pub(super) async fn layers(&mut self) -> Result<Arc<ImageStreamLayers>, GetterError> {
        if let Some(cached) = self.layers.cached() {
            return cached;
        }
        let result = self
            .context
            .run(self.client.get_image_stream_layers(&self.namespace, &self.name))
            .await;
        self.layers
            .settle(result, "image stream layers", &self.namespace, &self.name)
    }

    /// Replace the cached stream with one we know exists
    pub(super) fn cache_image_stream(&mut self, stream: ImageStream) {
        self.stream = Memo::Ready(Arc::new(stream));
    }
}

/// Fetches images by digest, each digest at most once
pub(super) struct CachedImageGetter {
    client: Arc<dyn MetadataClient>,
    context: RequestContext,
    images: HashMap<ContentDigest, Result<Arc<Image>, TransportError>>,
}

impl CachedImageGetter {
    pub(super) fn new(client: Arc<dyn MetadataClient>, context: RequestContext) -> Self {
        CachedImageGetter {
            client,
            context,
            images: HashMap::new(),
        }
    }

    pub(super) async fn get(&mut self, digest: &ContentDigest) -> Result<Arc<Image>, TransportError> {
        if let Some(cached) = self.images.get(digest) {
            return cached.clone();
        }
        let result = self
            .context
            .run(self.client.get_image(digest))
            .await
            .map(Arc::new);
        match &result {
            Err(err) if err.is_cancelled() => {}
            _ => {
                self.images.insert(digest.clone(), result.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StatusError;

    #[test]
    fn memo_remembers_failures() {
        let mut memo: Memo<u32> = Memo::Unfetched;
        assert!(memo.cached().is_none());
        let err = memo
            .settle(
                Err(StatusError::forbidden("imagestreams", "app", "denied").into()),
                "image stream",
                "team",
                "app",
            )
            .unwrap_err();
        assert_eq!(err.code(), GetterCode::Forbidden);
        assert_eq!(err.to_string(), "access denied: image stream team/app");
        let cached = memo.cached().unwrap().unwrap_err();
        assert_eq!(cached.code(), GetterCode::Forbidden);
    }

    #[test]
    fn memo_forgets_cancellation() {
        let mut memo: Memo<u32> = Memo::Unfetched;
        let err = memo
            .settle(Err(TransportError::Cancelled), "image stream", "team", "app")
            .unwrap_err();
        assert_eq!(err.code(), GetterCode::Unknown);
        assert!(memo.cached().is_none());
        assert_eq!(*memo.settle(Ok(5), "image stream", "team", "app").unwrap(), 5);
        assert_eq!(*memo.cached().unwrap().unwrap(), 5);
    }

    #[test]
    fn getter_codes() {
        let code = |err: TransportError| GetterError::new(err, "image stream", "a", "b").code();
        assert_eq!(code(StatusError::not_found("imagestreams", "b").into()), GetterCode::NotFound);
        assert_eq!(
            code(StatusError::forbidden("imagestreams", "b", "no").into()),
            GetterCode::Forbidden
        );
        assert_eq!(code(StatusError::unauthorized("who").into()), GetterCode::Unknown);
        assert_eq!(code(StatusError::from_code(500, "oops".to_owned()).into()), GetterCode::Unknown);
    }
}
