//! Error taxonomy for Daedalus.
//!
//! [`DaedalusError`] classifies every failure a server can surface into an
//! [`ErrorKind`]. Each kind has a default HTTP status and gRPC status code so
//! transports can translate errors without knowing where they came from.
//!
//! | `ErrorKind` | HTTP | gRPC |
//! |---|---|---|
//! | `Config` | 500 | `INTERNAL` |
//! | `Transport` | 502 | `UNAVAILABLE` |
//! | `Client` | 400 | `INVALID_ARGUMENT` |
//! | `Unauthenticated` | 401 | `UNAUTHENTICATED` |
//! | `RateLimited` | 429 | `RESOURCE_EXHAUSTED` |
//! | `Unavailable` | 503 | `UNAVAILABLE` |
//! | `Timeout` | 504 | `DEADLINE_EXCEEDED` |
//! | `Upstream` | 500 | `INTERNAL` |
//! | `Panic` | 500 | `INTERNAL` |
//! | `Fatal` | 500 | `INTERNAL` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`DaedalusError`].
pub type DaedalusResult<T> = Result<T, DaedalusError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid configuration.
    Config,
    /// Listener bind or socket failures.
    Transport,
    /// Bad input from the caller.
    Client,
    /// Missing or invalid credentials.
    Unauthenticated,
    /// Rate limit exceeded.
    RateLimited,
    /// Circuit open or dependency unavailable.
    Unavailable,
    /// Deadline exceeded.
    Timeout,
    /// A handler or downstream dependency failed.
    Upstream,
    /// A panic was caught.
    Panic,
    /// A dependency was missing at construction time.
    Fatal,
}

/// gRPC status codes used by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GrpcCode {
    /// `OK`
    Ok = 0,
    /// `INVALID_ARGUMENT`
    InvalidArgument = 3,
    /// `DEADLINE_EXCEEDED`
    DeadlineExceeded = 4,
    /// `RESOURCE_EXHAUSTED`
    ResourceExhausted = 8,
    /// `INTERNAL`
    Internal = 13,
    /// `UNAVAILABLE`
    Unavailable = 14,
    /// `UNAUTHENTICATED`
    Unauthenticated = 16,
}

impl GrpcCode {
    /// Returns the numeric code sent in the `grpc-status` trailer.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl ErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Client => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport => StatusCode::BAD_GATEWAY,
            Self::Config | Self::Upstream | Self::Panic | Self::Fatal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the gRPC status code for this kind.
    #[must_use]
    pub const fn grpc_code(&self) -> GrpcCode {
        match self {
            Self::Client => GrpcCode::InvalidArgument,
            Self::Unauthenticated => GrpcCode::Unauthenticated,
            Self::RateLimited => GrpcCode::ResourceExhausted,
            Self::Unavailable | Self::Transport => GrpcCode::Unavailable,
            Self::Timeout => GrpcCode::DeadlineExceeded,
            Self::Config | Self::Upstream | Self::Panic | Self::Fatal => GrpcCode::Internal,
        }
    }
}

/// Standard error type for Daedalus.
///
/// # Example
///
/// ```
/// use daedalus_core::{DaedalusError, ErrorKind};
/// use http::StatusCode;
///
/// let error = DaedalusError::rate_limited("too many requests", Some(1));
/// assert_eq!(error.kind(), ErrorKind::RateLimited);
/// assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
/// ```
#[derive(Error, Debug)]
pub enum DaedalusError {
    /// Configuration is missing or invalid.
    #[error("config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Transport failure, such as a listener bind error.
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable error message.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: Option<std::io::Error>,
    },

    /// The caller sent a bad request.
    #[error("client error: {message}")]
    Client {
        /// Human-readable error message.
        message: String,
    },

    /// Credentials are missing or invalid.
    #[error("unauthorized: {message}")]
    Unauthenticated {
        /// Human-readable error message.
        message: String,
    },

    /// A rate limit rejected the request.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until a retry may succeed.
        retry_after_seconds: Option<u64>,
    },

    /// A circuit breaker or dependency is unavailable.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Human-readable error message.
        message: String,
    },

    /// The request deadline was exceeded.
    #[error("timeout: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// A handler or downstream dependency failed.
    #[error("upstream error: {message}")]
    Upstream {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A panic was recovered.
    #[error("panic recovered: {message}")]
    Panic {
        /// The panic payload rendered as text.
        message: String,
    },

    /// A required dependency was missing.
    #[error("fatal: {message}")]
    Fatal {
        /// Human-readable error message.
        message: String,
    },
}

impl DaedalusError {
    /// Creates a config error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error wrapping an I/O error.
    #[must_use]
    pub fn transport(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a client error.
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// Creates an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an upstream error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an upstream error with a source error.
    pub fn upstream_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a panic error.
    #[must_use]
    pub fn panic(message: impl Into<String>) -> Self {
        Self::Panic {
            message: message.into(),
        }
    }

    /// Creates a fatal error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Client { .. } => ErrorKind::Client,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Panic { .. } => ErrorKind::Panic,
            Self::Fatal { .. } => ErrorKind::Fatal,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Returns the gRPC status code for this error.
    #[must_use]
    pub const fn grpc_code(&self) -> GrpcCode {
        self.kind().grpc_code()
    }

    /// Returns the message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config { message }
            | Self::Transport { message, .. }
            | Self::Client { message }
            | Self::Unauthenticated { message }
            | Self::RateLimited { message, .. }
            | Self::Unavailable { message }
            | Self::Timeout { message }
            | Self::Upstream { message, .. }
            | Self::Panic { message }
            | Self::Fatal { message } => message,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Client { .. } => "BAD_REQUEST",
            Self::Unauthenticated { .. } => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Unavailable { .. } => "CIRCUIT_OPEN",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Upstream { .. } => "INTERNAL_ERROR",
            Self::Panic { .. } => "PANIC",
            Self::Fatal { .. } => "FATAL",
        }
    }

    /// Returns the retry hint for rate-limited errors.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
            _ => None,
        }
    }

    /// Converts this error to a serializable failure body.
    #[must_use]
    pub fn to_envelope(&self, trace_id: &str) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code(), self.message(), trace_id)
    }
}

/// JSON failure body returned by every HTTP transport.
///
/// ```json
/// {"code": "RATE_LIMITED", "message": "rate limit exceeded", "trace_id": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Trace identifier for correlation.
    pub trace_id: String,
}

impl ErrorEnvelope {
    /// Creates a failure body.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            trace_id: trace_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited() {
        let error = DaedalusError::rate_limited("slow down", Some(2));
        assert_eq!(error.kind(), ErrorKind::RateLimited);
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.grpc_code(), GrpcCode::ResourceExhausted);
        assert_eq!(error.retry_after_seconds(), Some(2));
    }

    #[test]
    fn test_unavailable_maps_to_503_and_14() {
        let error = DaedalusError::unavailable("circuit breaker triggered");
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.grpc_code().as_u8(), 14);
    }

    #[test]
    fn test_unauthenticated() {
        let error = DaedalusError::unauthenticated("missing token");
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.grpc_code().as_u8(), 16);
        assert_eq!(error.message(), "missing token");
        assert!(error.to_string().contains("missing token"));
    }

    #[test]
    fn test_upstream_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "db down");
        let error = DaedalusError::upstream_with_source("query failed", io);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_envelope_serialization() {
        let error = DaedalusError::timeout("deadline exceeded");
        let envelope = error.to_envelope("trace-9");

        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("\"code\":\"TIMEOUT\""));
        assert!(json.contains("\"trace_id\":\"trace-9\""));
    }

    #[test]
    fn test_all_kinds_have_error_status_codes() {
        let kinds = [
            ErrorKind::Config,
            ErrorKind::Transport,
            ErrorKind::Client,
            ErrorKind::Unauthenticated,
            ErrorKind::RateLimited,
            ErrorKind::Unavailable,
            ErrorKind::Timeout,
            ErrorKind::Upstream,
            ErrorKind::Panic,
            ErrorKind::Fatal,
        ];

        for kind in kinds {
            let status = kind.status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Kind {:?} should map to error status code, got {}",
                kind,
                status
            );
            assert_ne!(kind.grpc_code(), GrpcCode::Ok);
        }
    }
}
