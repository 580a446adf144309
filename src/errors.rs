//! Error types you might see while resolving image stream metadata

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Errors while parsing digests, registry names, and image references
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ReferenceError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// invalid content digest format
    #[error("invalid content digest format: {0:?}")]
    InvalidDigestFormat(String),
}

/// Well-known reasons attached to a metadata service failure
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum StatusReason {
    NotFound,
    AlreadyExists,
    Conflict,
    Forbidden,
    Unauthorized,
    Invalid,
    #[serde(other)]
    Unknown,
}

impl Default for StatusReason {
    fn default() -> Self {
        StatusReason::Unknown
    }
}

/// The resource a metadata service failure refers to
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kind: String,
}

/// Structured failure reported by the metadata service
///
/// This is the `Status` object the service returns in the body of a failed
/// request. The reason is optional on the wire; when it is missing or not one
/// we recognize, [StatusError::reason()] falls back to the HTTP status code.
#[derive(Error, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[error("{message}")]
pub struct StatusError {
    #[serde(default)]
    pub code: u16,
    #[serde(default, rename = "reason")]
    pub raw_reason: StatusReason,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StatusDetails>,
}

impl StatusError {
    fn new(code: u16, reason: StatusReason, kind: &str, name: &str, message: String) -> Self {
        StatusError {
            code,
            raw_reason: reason,
            message,
            details: Some(StatusDetails {
                name: name.to_owned(),
                group: String::new(),
                kind: kind.to_owned(),
            }),
        }
    }

    pub fn not_found(kind: &str, name: &str) -> Self {
        StatusError::new(
            404,
            StatusReason::NotFound,
            kind,
            name,
            format!("{} {:?} not found", kind, name),
        )
    }

    pub fn already_exists(kind: &str, name: &str) -> Self {
        StatusError::new(
            409,
            StatusReason::AlreadyExists,
            kind,
            name,
            format!("{} {:?} already exists", kind, name),
        )
    }

    pub fn conflict(kind: &str, name: &str, message: &str) -> Self {
        StatusError::new(
            409,
            StatusReason::Conflict,
            kind,
            name,
            format!("operation cannot be fulfilled on {} {:?}: {}", kind, name, message),
        )
    }

    pub fn forbidden(kind: &str, name: &str, message: &str) -> Self {
        StatusError::new(
            403,
            StatusReason::Forbidden,
            kind,
            name,
            format!("{} {:?} is forbidden: {}", kind, name, message),
        )
    }

    pub fn unauthorized(message: &str) -> Self {
        StatusError {
            code: 401,
            raw_reason: StatusReason::Unauthorized,
            message: message.to_owned(),
            details: None,
        }
    }

    pub fn invalid(kind: &str, name: &str, message: &str) -> Self {
        StatusError::new(
            422,
            StatusReason::Invalid,
            kind,
            name,
            format!("{} {:?} is invalid: {}", kind, name, message),
        )
    }

    /// Build a status from a bare HTTP code, used when a response body could
    /// not be decoded
    pub fn from_code(code: u16, message: String) -> Self {
        StatusError {
            code,
            raw_reason: StatusReason::Unknown,
            message,
            details: None,
        }
    }

    /// The failure reason, inferred from the HTTP code if none was reported
    pub fn reason(&self) -> StatusReason {
        match self.raw_reason {
            StatusReason::Unknown => match self.code {
                401 => StatusReason::Unauthorized,
                403 => StatusReason::Forbidden,
                404 => StatusReason::NotFound,
                409 => StatusReason::Conflict,
                422 => StatusReason::Invalid,
                _ => StatusReason::Unknown,
            },
            ref reason => reason.clone(),
        }
    }

    /// Kind of the resource named in the details, if any
    pub fn details_kind(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.kind.as_str())
    }

    /// Name of the resource named in the details, if any
    pub fn details_name(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.name.as_str())
    }
}

/// Errors from a metadata service transport
///
/// Cloneable, so a failed fetch can be memoized and handed out again.
#[derive(Error, Clone, Debug)]
pub enum TransportError {
    /// metadata service reported a failure
    #[error("metadata service error: {0}")]
    Status(#[from] StatusError),

    /// request was cancelled before it completed
    #[error("request was cancelled before it completed")]
    Cancelled,

    /// network request error
    #[error("network request error: {0}")]
    Network(Arc<reqwest::Error>),

    /// json error
    #[error("json error: {0}")]
    JSON(Arc<serde_json::Error>),

    /// invalid url for metadata service request
    #[error("invalid url for metadata service request: {0}")]
    Url(#[from] url::ParseError),

    /// metadata service client is not configured correctly
    #[error("metadata service client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::JSON(Arc::new(err))
    }
}

impl TransportError {
    /// The structured status, if the service reported one
    pub fn status(&self) -> Option<&StatusError> {
        match self {
            TransportError::Status(status) => Some(status),
            _ => None,
        }
    }

    fn has_reason(&self, reason: StatusReason) -> bool {
        self.status().map(|s| s.reason() == reason).unwrap_or(false)
    }

    pub fn is_not_found(&self) -> bool {
        self.has_reason(StatusReason::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.has_reason(StatusReason::AlreadyExists)
    }

    pub fn is_conflict(&self) -> bool {
        self.has_reason(StatusReason::Conflict)
    }

    pub fn is_forbidden(&self) -> bool {
        self.has_reason(StatusReason::Forbidden)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.has_reason(StatusReason::Unauthorized)
    }

    pub fn is_invalid(&self) -> bool {
        self.has_reason(StatusReason::Invalid)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Stable error codes returned by [crate::ImageStream] operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    NotFound,
    ImageNotFound,
    Forbidden,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "ImageStream:Unknown",
            ErrorCode::NotFound => "ImageStream:NotFound",
            ErrorCode::ImageNotFound => "ImageStream:ImageNotFound",
            ErrorCode::Forbidden => "ImageStream:Forbidden",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by [crate::ImageStream]
///
/// Every error carries one of the stable [ErrorCode] values, a message
/// describing the failed operation, and the error that caused it.
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct ImageStreamError {
    code: ErrorCode,
    message: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl ImageStreamError {
    pub(crate) fn new<E>(code: ErrorCode, message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ImageStreamError {
            code,
            message,
            source: Box::new(source),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors from a [crate::cache::ProjectObjectListStore]
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CacheError {
    /// cache has no room for another namespace
    #[error("cache has no room for namespace {0:?}")]
    Full(String),
}
