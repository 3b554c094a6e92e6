//! Error types for the engine.

use jam_core::CoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while loading views, serializing writes or syncing.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Core(#[from] CoreError),

    /// A caller-supplied fetch function failed.
    #[error("fetch error in query {query}: {message}")]
    Fetch {
        /// Name of the query whose fetch failed.
        query: String,
        /// Error message from the fetch function.
        message: String,
    },

    /// Server round trip failed while submitting a diff.
    #[error("sync transport error: {message}")]
    SyncTransport {
        /// Error message.
        message: String,
        /// Whether the round trip can be retried.
        retryable: bool,
    },

    /// The mutation serializer is no longer accepting writes.
    #[error("mutation serializer closed")]
    SerializerClosed,

    /// A background task ended abnormally.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::SyncTransport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a transport error that another round trip will not fix.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::SyncTransport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a fetch error for a query.
    pub fn fetch(query: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            query: query.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if sending the same diff again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SyncTransport { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(EngineError::transport_retryable("connection lost").is_retryable());
        assert!(!EngineError::transport_fatal("invalid certificate").is_retryable());
        assert!(!EngineError::SerializerClosed.is_retryable());
        assert!(!EngineError::from(CoreError::unknown_transaction("t")).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = EngineError::SerializerClosed;
        assert_eq!(err.to_string(), "mutation serializer closed");

        let err = EngineError::fetch("posts", "404 Not Found");
        assert_eq!(err.to_string(), "fetch error in query posts: 404 Not Found");

        let err = EngineError::from(CoreError::duplicate_transaction("edit"));
        assert!(err.to_string().contains("edit"));
    }
}
