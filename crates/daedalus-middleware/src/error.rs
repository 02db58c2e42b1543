//! Middleware construction errors.

use daedalus_breaker::BreakerError;
use daedalus_core::DaedalusError;
use daedalus_limiter::LimitError;
use thiserror::Error;

/// Result type for building middleware.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

/// Errors raised while building a middleware chain.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// An option is unusable.
    #[error("invalid middleware config: {0}")]
    InvalidConfig(String),

    /// The rate limit settings are unusable.
    #[error(transparent)]
    Limit(#[from] LimitError),

    /// The breaker settings are unusable.
    #[error(transparent)]
    Breaker(#[from] BreakerError),
}

impl MiddlewareError {
    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<MiddlewareError> for DaedalusError {
    fn from(error: MiddlewareError) -> Self {
        Self::config(error.to_string())
    }
}
