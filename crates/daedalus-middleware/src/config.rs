//! Middleware options.
//!
//! Every policy is opt-in through an `Option` field; the always-on stages
//! (logging, recovery, timeout) have boolean or numeric switches.

use daedalus_breaker::BreakerConfig;
use daedalus_limiter::RateLimitConfig;
use serde::{Deserialize, Serialize};

use crate::error::{MiddlewareError, MiddlewareResult};

/// Default header the token is read from.
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// Default token prefix.
pub const DEFAULT_TOKEN_PREFIX: &str = "Bearer";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Options for building a middleware chain or gRPC layer.
///
/// # Example
///
/// ```rust
/// use daedalus_middleware::MiddlewareConfig;
///
/// let config: MiddlewareConfig = serde_json::from_str(
///     r#"{"auth": {"jwtSecret": "s3cret", "whiteList": ["/health"]}, "enableMetrics": true}"#,
/// )
/// .unwrap();
/// assert!(config.auth.is_some());
/// assert!(config.enable_logging);
/// assert_eq!(config.timeout_seconds, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiddlewareConfig {
    /// JWT authentication
    pub auth: Option<AuthConfig>,
    /// Per-route token buckets
    pub rate_limit: Option<RateLimitConfig>,
    /// Per-route circuit breakers
    pub circuit_breaker: Option<BreakerConfig>,
    /// Record request duration metrics
    pub enable_metrics: bool,
    /// Emit one structured event per request
    pub enable_logging: bool,
    /// Turn panics into 500 responses
    pub enable_recovery: bool,
    /// Per-request deadline in seconds; 0 disables it
    pub timeout_seconds: u64,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            auth: None,
            rate_limit: None,
            circuit_breaker: None,
            enable_metrics: false,
            enable_logging: true,
            enable_recovery: true,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl MiddlewareConfig {
    /// Returns a config with every stage switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_logging: false,
            enable_recovery: false,
            timeout_seconds: 0,
            ..Self::default()
        }
    }

    /// Checks every enabled policy.
    pub fn validate(&self) -> MiddlewareResult<()> {
        if let Some(auth) = &self.auth {
            auth.validate()?;
        }
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }
        Ok(())
    }
}

/// JWT authentication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Paths that skip authentication.
    ///
    /// An entry matches exactly, or as a prefix when it ends in `/`. An
    /// entry of the form `"GET /path"` only matches that method.
    #[serde(rename = "whiteList")]
    pub whitelist: Vec<String>,
    /// Header carrying the token
    pub header_key: String,
    /// Prefixes stripped from the header value, e.g. `Bearer`
    pub token_prefixes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            whitelist: Vec::new(),
            header_key: DEFAULT_AUTH_HEADER.to_string(),
            token_prefixes: vec![DEFAULT_TOKEN_PREFIX.to_string()],
        }
    }
}

impl AuthConfig {
    /// Creates a config with `secret` and default header handling.
    #[must_use]
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Self::default()
        }
    }

    /// Adds whitelist entries.
    #[must_use]
    pub fn whitelist<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Checks the secret and header name.
    pub fn validate(&self) -> MiddlewareResult<()> {
        if self.jwt_secret.is_empty() {
            return Err(MiddlewareError::invalid_config("auth.jwtSecret must not be empty"));
        }
        if self.header_key.is_empty() {
            return Err(MiddlewareError::invalid_config("auth.headerKey must not be empty"));
        }
        Ok(())
    }
}
