//! Error types for the sync bridge and batch runner.

use std::time::Duration;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the bridge itself, as opposed to the submitted
/// operation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The caller's deadline elapsed while waiting.
    ///
    /// Cancellation is signalled to the operation but is cooperative: a
    /// timed-out call means the caller gave up, not that the operation's
    /// effects were reverted.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// `run_sync` was called from the loop thread itself.
    ///
    /// Blocking the loop thread on its own work deadlocks, so the call is
    /// rejected instead.
    #[error("blocking call from the event-loop thread would deadlock")]
    Reentrant,

    /// The background loop could not be started or has gone away.
    #[error("event loop unavailable: {message}")]
    LoopUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The submitted operation panicked.
    #[error("submitted operation panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl BridgeError {
    pub(crate) fn loop_unavailable(message: impl Into<String>) -> Self {
        Self::LoopUnavailable {
            message: message.into(),
        }
    }
}

/// Per-item outcome of a batch run that did not produce a value.
///
/// Index-aligned with the input: `results[i]` describes what happened to
/// task `i`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError<E> {
    /// The task ran and returned this error.
    #[error(transparent)]
    Failed(E),

    /// The per-task deadline elapsed; see [`BridgeError::Timeout`] for
    /// the cancellation caveat.
    #[error("task timed out")]
    Timeout,

    /// An earlier failure stopped the run before this task started.
    #[error("task cancelled before it started")]
    Cancelled,

    /// The task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl<E> TaskError<E> {
    /// The inner error, when the task ran and failed.
    pub fn into_failed(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}
