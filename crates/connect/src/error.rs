//! Error types for the connect crate.

use thiserror::Error;

use stockbook_core::errors::RemoteStoreError;

/// Result type alias for connect operations.
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Retry policy class for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRetryClass {
    Retryable,
    Permanent,
}

/// Errors that can occur talking to the cloud row store.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the cloud service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (unfiltered mutation, missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConnectError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ConnectRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                408 | 409 | 423 | 425 | 429 => ConnectRetryClass::Retryable,
                500..=599 => ConnectRetryClass::Retryable,
                _ => ConnectRetryClass::Permanent,
            },
            Self::Http(_) => ConnectRetryClass::Retryable,
            Self::Json(_) => ConnectRetryClass::Permanent,
            Self::InvalidRequest(_) => ConnectRetryClass::Permanent,
            Self::Config(_) => ConnectRetryClass::Permanent,
        }
    }
}

impl From<ConnectError> for RemoteStoreError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Http(inner) => RemoteStoreError::transport(inner.to_string()),
            ConnectError::Json(inner) => RemoteStoreError::decode(inner.to_string()),
            ConnectError::Api { status, message } => RemoteStoreError::api(status, message),
            ConnectError::InvalidRequest(message) => RemoteStoreError::invalid_request(message),
            ConnectError::Config(message) => RemoteStoreError::invalid_request(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_server_errors() {
        assert_eq!(
            ConnectError::api(500, "boom").retry_class(),
            ConnectRetryClass::Retryable
        );
        assert_eq!(
            ConnectError::api(429, "slow down").retry_class(),
            ConnectRetryClass::Retryable
        );
        assert_eq!(
            ConnectError::api(400, "bad").retry_class(),
            ConnectRetryClass::Permanent
        );
    }

    #[test]
    fn maps_into_remote_store_error() {
        let mapped: RemoteStoreError = ConnectError::api(503, "unavailable").into();
        assert_eq!(mapped.status_code(), Some(503));
    }
}
