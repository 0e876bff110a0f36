//! Error types for the caching engine.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the caching engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The backend fetch or upload primitive failed.
    ///
    /// Transport failures are propagated unchanged; they are not retried
    /// at this layer.
    #[error("backend error: {0}")]
    Backend(#[from] rangecache_backend::BackendError),

    /// I/O error on local cache storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A precondition was violated (bad mode, unknown size, invalid range).
    #[error("configuration error: {message}")]
    Config {
        /// Description of the violated precondition.
        message: String,
    },

    /// Operation not supported in the current mode or state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The file is closed.
    #[error("file is closed")]
    Closed,

    /// No cache strategy is registered under this name.
    #[error("unknown cache strategy: {name}")]
    UnknownCache {
        /// The requested strategy name.
        name: String,
    },

    /// A cache strategy is already registered under this name.
    #[error("cache strategy already registered: {name}")]
    DuplicateCache {
        /// The conflicting strategy name.
        name: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
