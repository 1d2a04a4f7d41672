//! Error types for the data layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Storage Error Enum ==
/// Failures talking to the durable backing store.
///
/// These never escape the cache: they are logged and the cache keeps working
/// from memory.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Writing the slot would exceed the store's size limit
    #[error("Quota exceeded: {needed} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { needed: usize, limit: usize },

    /// Store cannot be used at all (disabled, poisoned, missing directory)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Underlying filesystem error
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mapping could not be encoded or decoded
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for backing store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// == Api Error Enum ==
/// Failures crossing the remote API boundary.
///
/// `Clone` because one outcome may be handed to several deduplicated waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Connection, timeout or other transport failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body was not valid JSON
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

// == Crate Error Enum ==
/// Unified error type for accessor and mutation operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network call failed; nothing was cached
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Network call failed during an optimistic mutation; the displayed list
    /// has been restored to its pre-mutation state
    #[error("{operation} did not go through: {source}")]
    RolledBack {
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// Payload could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource name or key segment rejected by the key grammar
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Configuration value out of range
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if the error came from the remote API, whether or not a
    /// rollback happened.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Api(_) | Error::RolledBack { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the data layer.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolled_back_message_names_operation() {
        let err = Error::RolledBack {
            operation: "delete",
            source: ApiError::Status {
                status: 500,
                message: "boom".to_string(),
            },
        };

        assert_eq!(err.to_string(), "delete did not go through: Server returned 500: boom");
        assert!(err.is_network());
    }

    #[test]
    fn test_quota_message() {
        let err = StorageError::QuotaExceeded {
            needed: 10,
            limit: 5,
        };
        assert!(err.to_string().contains("10 bytes requested"));
    }

    #[test]
    fn test_invalid_key_is_not_network() {
        assert!(!Error::InvalidKey("Bad Name".to_string()).is_network());
    }
}
