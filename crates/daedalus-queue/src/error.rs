//! Error types for queue and worker pool operations.

use daedalus_core::DaedalusError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for worker pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors raised by codecs and queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A value could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A payload could not be deserialized.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// The queue backend failed.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// Invalid queue configuration.
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Create an encode error.
    pub fn encode(reason: impl ToString) -> Self {
        Self::Encode(reason.to_string())
    }

    /// Create a decode error.
    pub fn decode(reason: impl ToString) -> Self {
        Self::Decode(reason.to_string())
    }

    /// Create a backend error.
    pub fn backend(reason: impl ToString) -> Self {
        Self::Backend(reason.to_string())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

impl From<QueueError> for DaedalusError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::InvalidConfig(msg) => Self::config(msg),
            other => Self::upstream(other.to_string()),
        }
    }
}

/// Reasons a worker pool refuses a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every worker slot is busy.
    #[error("worker pool saturated, capacity {capacity}")]
    Saturated {
        /// The pool capacity.
        capacity: usize,
    },

    /// The pool has been released.
    #[error("worker pool closed")]
    Closed,
}
