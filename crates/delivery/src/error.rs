//! Error types for the delivery crate.

use thiserror::Error;

use fieldops_core::sync::{classify_http_status, RetryClass};

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors that can occur while delivering a queued mutation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transport-level failure: no response, timeout, connection reset.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Well-formed rejection from the server.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid request (missing required data, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DeliveryError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify this failure for the sync engine's retry policy.
    ///
    /// Transport failures are always retryable: the write may never have
    /// reached the server. Server rejections follow the shared HTTP status
    /// mapping; a malformed response body or request is permanent.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Transport(_) => RetryClass::Retryable,
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Json(_) => RetryClass::Permanent,
            Self::InvalidRequest(_) => RetryClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_rejections_follow_status_mapping() {
        assert_eq!(
            DeliveryError::api(503, "unavailable").retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            DeliveryError::api(429, "slow down").retry_class(),
            RetryClass::Retryable
        );
        assert_eq!(
            DeliveryError::api(422, "validation failed").retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            DeliveryError::api(409, "stale write").retry_class(),
            RetryClass::Permanent
        );
        assert_eq!(
            DeliveryError::api(401, "unauthorized").retry_class(),
            RetryClass::Permanent
        );
    }

    #[test]
    fn malformed_payloads_are_permanent() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(DeliveryError::from(err).retry_class(), RetryClass::Permanent);
    }
}
