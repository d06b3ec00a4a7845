//! Error types for the stockbook core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Retry policy class for remote store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRetryClass {
    Retryable,
    Permanent,
}

/// Errors returned by the remote row-store capability.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered with an error status.
    #[error("remote error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded as rows.
    #[error("decode error: {0}")]
    Decode(String),

    /// Request rejected before it was sent (bad filter, missing id, etc.)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No remote client has been injected yet.
    #[error("remote store not configured")]
    NotConfigured,
}

impl RemoteStoreError {
    /// Create a transport error from any displayable cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an API error from status and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RemoteRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                408 | 409 | 423 | 425 | 429 => RemoteRetryClass::Retryable,
                500..=599 => RemoteRetryClass::Retryable,
                _ => RemoteRetryClass::Permanent,
            },
            Self::Transport(_) => RemoteRetryClass::Retryable,
            Self::Decode(_) => RemoteRetryClass::Permanent,
            Self::InvalidRequest(_) => RemoteRetryClass::Permanent,
            Self::NotConfigured => RemoteRetryClass::Permanent,
        }
    }
}

/// Errors from the durable local key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing storage could not be reached or mutated (quota, I/O, locking).
    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value failed to round-trip through serialization.
    #[error("stored value corrupted: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

/// Top-level error for coordinator operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteStoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl Error {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_server_errors_is_retryable() {
        assert_eq!(
            RemoteStoreError::api(503, "unavailable").retry_class(),
            RemoteRetryClass::Retryable
        );
        assert_eq!(
            RemoteStoreError::transport("connection reset").retry_class(),
            RemoteRetryClass::Retryable
        );
    }

    #[test]
    fn retry_class_for_client_errors_is_permanent() {
        assert_eq!(
            RemoteStoreError::api(400, "bad request").retry_class(),
            RemoteRetryClass::Permanent
        );
        assert_eq!(
            RemoteStoreError::decode("not an array").retry_class(),
            RemoteRetryClass::Permanent
        );
    }

    #[test]
    fn status_code_only_for_api_errors() {
        assert_eq!(RemoteStoreError::api(500, "boom").status_code(), Some(500));
        assert_eq!(RemoteStoreError::NotConfigured.status_code(), None);
    }
}
