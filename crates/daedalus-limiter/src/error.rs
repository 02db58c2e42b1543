//! Rate limiter errors.

use std::time::Duration;

use daedalus_core::{ContextError, DaedalusError};
use thiserror::Error;

/// Result type for limiter operations.
pub type LimitResult<T> = Result<T, LimitError>;

/// Errors returned by the limiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitError {
    /// The bucket was empty in allow mode.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// Time until a token becomes available
        retry_after: Duration,
    },

    /// A wait-mode acquisition was interrupted by the request context.
    #[error("rate limit wait interrupted: {0}")]
    Cancelled(ContextError),

    /// The bucket parameters are unusable.
    #[error("invalid rate limit config: {0}")]
    InvalidConfig(String),
}

impl LimitError {
    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns the retry hint in whole seconds, rounded up and at least one.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Exceeded { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}

impl From<LimitError> for DaedalusError {
    fn from(error: LimitError) -> Self {
        match error {
            LimitError::Exceeded { .. } => {
                Self::rate_limited("rate limit exceeded", error.retry_after_seconds())
            }
            LimitError::Cancelled(reason) => {
                Self::rate_limited(format!("rate limit wait interrupted: {reason}"), None)
            }
            LimitError::InvalidConfig(message) => Self::config(message),
        }
    }
}
