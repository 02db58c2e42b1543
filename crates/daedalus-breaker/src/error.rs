//! Circuit breaker errors.

use daedalus_core::DaedalusError;
use thiserror::Error;

/// Result type for breaker operations.
pub type BreakerResult<T> = Result<T, BreakerError>;

/// Errors produced by a breaker instead of running the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreakerError {
    /// The breaker is open.
    #[error("circuit breaker triggered: `{0}` is open")]
    Open(String),

    /// The breaker is half-open and all probe slots are taken.
    #[error("circuit breaker triggered: too many requests to half-open `{0}`")]
    TooManyRequests(String),

    /// The breaker settings are unusable.
    #[error("invalid circuit breaker config: {0}")]
    InvalidConfig(String),
}

impl From<BreakerError> for DaedalusError {
    fn from(error: BreakerError) -> Self {
        match error {
            BreakerError::Open(_) | BreakerError::TooManyRequests(_) => {
                Self::unavailable(error.to_string())
            }
            BreakerError::InvalidConfig(message) => Self::config(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::ErrorKind;

    #[test]
    fn test_rejections_map_to_unavailable() {
        let err: DaedalusError = BreakerError::Open("/f".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.message().contains("circuit breaker triggered"));

        let err: DaedalusError = BreakerError::TooManyRequests("/f".into()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
