//! HTTP surface errors.

use daedalus_core::{DaedalusError, ErrorEnvelope};
use http::StatusCode;
use thiserror::Error;

/// Result alias for handlers and responders.
pub type HttpResult<T = ()> = Result<T, HttpError>;

/// Errors raised by handlers, middleware and responders.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request body or query could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A requested part of the request is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A responder ran after the body was already written.
    #[error("response body already written")]
    AlreadyWritten,

    /// Filesystem or socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The template renderer failed or is missing.
    #[error("render error: {0}")]
    Render(String),

    /// An explicit status with a message.
    #[error("{message}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Client-facing message.
        message: String,
    },

    /// A policy or toolkit error from a lower layer.
    #[error(transparent)]
    Policy(#[from] DaedalusError),
}

impl HttpError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates an error with an explicit status.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a 500 error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::status(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Returns the response status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyWritten | Self::Io(_) | Self::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Status { status, .. } => *status,
            Self::Policy(err) => err.status_code(),
        }
    }

    /// Returns the machine-readable code used in the failure body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Policy(err) => err.code(),
            Self::Decode(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyWritten | Self::Io(_) | Self::Render(_) => "INTERNAL_ERROR",
            Self::Status { status, .. } => code_for_status(*status),
        }
    }

    /// Returns the `Retry-After` hint, if any.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Policy(err) => err.retry_after_seconds(),
            _ => None,
        }
    }

    /// Builds the JSON failure body.
    #[must_use]
    pub fn to_envelope(&self, trace_id: &str) -> ErrorEnvelope {
        match self {
            Self::Policy(err) => err.to_envelope(trace_id),
            Self::Status { message, .. } => ErrorEnvelope::new(self.code(), message, trace_id),
            other => ErrorEnvelope::new(other.code(), other.to_string(), trace_id),
        }
    }
}

/// Maps a bare status onto the failure-body code vocabulary.
pub(crate) fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
        StatusCode::PAYLOAD_TOO_LARGE => "PAYLOAD_TOO_LARGE",
        StatusCode::TOO_MANY_REQUESTS => "RATE_LIMITED",
        StatusCode::SERVICE_UNAVAILABLE => "CIRCUIT_OPEN",
        StatusCode::GATEWAY_TIMEOUT => "TIMEOUT",
        s if s.is_client_error() => "BAD_REQUEST",
        _ => "INTERNAL_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(HttpError::decode("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::not_found("file").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::AlreadyWritten.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            HttpError::from(DaedalusError::rate_limited("slow down", Some(2))).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_envelope_codes() {
        let err = HttpError::from(DaedalusError::unavailable("circuit breaker triggered"));
        let envelope = err.to_envelope("t-1");
        assert_eq!(envelope.code, "CIRCUIT_OPEN");
        assert_eq!(envelope.trace_id, "t-1");

        let err = HttpError::status(StatusCode::GATEWAY_TIMEOUT, "took too long");
        let envelope = err.to_envelope("t-2");
        assert_eq!(envelope.code, "TIMEOUT");
        assert_eq!(envelope.message, "took too long");
    }

    #[test]
    fn test_retry_after_passthrough() {
        let err = HttpError::from(DaedalusError::rate_limited("slow down", Some(3)));
        assert_eq!(err.retry_after_seconds(), Some(3));
        assert_eq!(HttpError::internal("x").retry_after_seconds(), None);
    }
}
