//! Recognizing quota and limit failures from the metadata service

use crate::errors::TransportError;
use regex::Regex;

/// Is this a rejection because a resource quota or limit would be exceeded?
///
/// The service reports these as Forbidden or Invalid failures; only the
/// message tells them apart from other denials.
pub fn is_quota_exceeded(err: &TransportError) -> bool {
    lazy_static! {
        static ref RE: Regex = Regex::new("exceeded quota|quota exceeded|is limited to").unwrap();
    }
    match err.status() {
        Some(status) if err.is_forbidden() || err.is_invalid() => {
            RE.is_match(&status.message.to_lowercase())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StatusError;

    #[test]
    fn quota_messages() {
        let err: TransportError = StatusError::forbidden(
            "imagestreammappings",
            "app",
            "Exceeded quota: images, requested: count=1",
        )
        .into();
        assert!(is_quota_exceeded(&err));

        let err: TransportError =
            StatusError::invalid("imagestreammappings", "app", "size is limited to 1Gi").into();
        assert!(is_quota_exceeded(&err));
    }

    #[test]
    fn other_failures() {
        let err: TransportError =
            StatusError::forbidden("imagestreams", "app", "user cannot create").into();
        assert!(!is_quota_exceeded(&err));

        let mut status = StatusError::not_found("imagestreams", "app");
        status.message = "exceeded quota".to_owned();
        assert!(!is_quota_exceeded(&status.into()));

        assert!(!is_quota_exceeded(&TransportError::Cancelled));
    }
}
