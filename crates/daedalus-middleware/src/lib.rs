//! # Daedalus Middleware
//!
//! Turns a [`MiddlewareConfig`] into policy middleware for the HTTP surface
//! or a `tower` layer for gRPC services.
//!
//! ## Stage order
//!
//! Stages run outermost first, and disabled stages are skipped:
//!
//! 1. **auth** - HS256 JWT validation with a path whitelist
//! 2. **circuit breaker** - per route pattern (HTTP) or method path (gRPC)
//! 3. **rate limit** - per-key token buckets
//! 4. **metrics** - `http_request_duration_seconds`
//! 5. **logging** - one structured event per request
//! 6. **recovery** - panics become 500 / `INTERNAL`
//! 7. **timeout** - deadline on the propagation context, 504 / `DEADLINE_EXCEEDED`
//!
//! ## Example
//!
//! ```rust
//! use daedalus_http::Router;
//! use daedalus_middleware::{install, AuthConfig, MiddlewareConfig};
//!
//! let config = MiddlewareConfig {
//!     auth: Some(AuthConfig::with_secret("s3cret").whitelist(["/health"])),
//!     ..MiddlewareConfig::default()
//! };
//! let mut router = Router::new();
//! install(&mut router, &config).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod auth;
mod breaker;
mod config;
mod error;
mod grpc;
mod logging;
mod metrics;
mod pipeline;
mod rate_limit;
mod recovery;
mod timeout;

pub use auth::{AuthMiddleware, Authenticator};
pub use breaker::BreakerMiddleware;
pub use config::{
    AuthConfig, MiddlewareConfig, DEFAULT_AUTH_HEADER, DEFAULT_TIMEOUT_SECONDS, DEFAULT_TOKEN_PREFIX,
};
pub use error::{MiddlewareError, MiddlewareResult};
pub use grpc::{trailers_only, GrpcMiddlewareLayer, GrpcMiddlewareService, GRPC_MESSAGE, GRPC_STATUS};
pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use pipeline::{build_http, install};
pub use rate_limit::RateLimitMiddleware;
pub use recovery::RecoveryMiddleware;
pub use timeout::TimeoutMiddleware;
