//! Error types for backend operations.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while fetching or uploading bytes.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Requested range lies outside the object.
    #[error("range out of bounds: [{start}, {end}) with object size {size}")]
    RangeOutOfBounds {
        /// The requested range start.
        start: u64,
        /// The requested range end (exclusive).
        end: u64,
        /// The current object size.
        size: u64,
    },

    /// The backend returned fewer bytes than requested.
    ///
    /// Fetchers must return exactly `end - start` bytes or fail; a short
    /// read is a contract violation by the transport.
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Bytes requested.
        wanted: usize,
        /// Bytes actually returned.
        got: usize,
    },

    /// The underlying transport failed.
    ///
    /// This wraps whatever a remote backend raised. It is not retried at
    /// this layer.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The caller's deadline elapsed while waiting on the backend.
    ///
    /// Distinct from [`Transport`](Self::Transport) so callers can decide
    /// to retry. The in-flight operation is not necessarily stopped; a
    /// timed-out upload chunk may still complete server-side.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: std::time::Duration,
    },

    /// The upload target was already finalized.
    #[error("upload already finalized")]
    UploadFinalized,

    /// The backend is closed.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}
