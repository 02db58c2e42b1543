//! Rate limit configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LimitError, LimitResult};

/// What happens when the bucket is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitMode {
    /// Reject immediately with [`LimitError::Exceeded`].
    #[default]
    Allow,
    /// Wait for a token, bounded by the request context.
    Wait,
}

/// Token bucket settings for one route (or the default).
///
/// The key parts enabled here decide which requests share a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteLimitConfig {
    /// Behaviour on an empty bucket
    pub mode: LimitMode,
    /// Include the route pattern in the key
    pub enable_route: bool,
    /// Include the client IP in the key
    #[serde(rename = "enableIP")]
    pub enable_ip: bool,
    /// Include the authenticated user id in the key
    #[serde(rename = "enableUserID")]
    pub enable_user_id: bool,
    /// Bucket capacity
    pub burst: u32,
    /// Refill rate in tokens per second
    pub rate: f64,
}

impl Default for RouteLimitConfig {
    fn default() -> Self {
        Self {
            mode: LimitMode::Allow,
            enable_route: true,
            enable_ip: true,
            enable_user_id: false,
            burst: 1,
            rate: 1.0,
        }
    }
}

impl RouteLimitConfig {
    /// Creates a config with the given rate and burst, keyed by route and IP.
    #[must_use]
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            ..Self::default()
        }
    }

    /// Sets the mode.
    #[must_use]
    pub fn with_mode(mut self, mode: LimitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Selects which parts make up the key.
    #[must_use]
    pub fn with_key_parts(mut self, route: bool, ip: bool, user_id: bool) -> Self {
        self.enable_route = route;
        self.enable_ip = ip;
        self.enable_user_id = user_id;
        self
    }

    /// Checks that `rate` is positive with a representable refill period and
    /// that `burst` is at least one.
    pub fn validate(&self) -> LimitResult<()> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(LimitError::invalid_config(format!(
                "rate must be a positive number, got {}",
                self.rate
            )));
        }
        if self.burst == 0 {
            return Err(LimitError::invalid_config("burst must be at least 1"));
        }
        self.refill_period()?;
        Ok(())
    }

    /// Returns the time needed to refill one token.
    pub fn refill_period(&self) -> LimitResult<Duration> {
        Duration::try_from_secs_f64(1.0 / self.rate).map_err(|_| {
            LimitError::invalid_config(format!("rate {} is out of range", self.rate))
        })
    }
}

/// Rate limiting for a whole router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Applied to routes without their own entry
    pub default: Option<RouteLimitConfig>,
    /// Keyed by route pattern, e.g. `/users/:id`
    pub per_route: HashMap<String, RouteLimitConfig>,
}

impl RateLimitConfig {
    /// Creates a config with only a default entry.
    #[must_use]
    pub fn with_default(default: RouteLimitConfig) -> Self {
        Self {
            default: Some(default),
            per_route: HashMap::new(),
        }
    }

    /// Adds a per-route entry.
    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, config: RouteLimitConfig) -> Self {
        self.per_route.insert(pattern.into(), config);
        self
    }

    /// Returns the config that applies to `pattern`, if any.
    #[must_use]
    pub fn for_route(&self, pattern: &str) -> Option<&RouteLimitConfig> {
        self.per_route.get(pattern).or(self.default.as_ref())
    }

    /// Validates every entry.
    pub fn validate(&self) -> LimitResult<()> {
        if let Some(default) = &self.default {
            default.validate()?;
        }
        for (pattern, config) in &self.per_route {
            config.validate().map_err(|e| {
                LimitError::invalid_config(format!("route `{pattern}`: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "default": {"mode": "wait", "rate": 5, "burst": 10, "enableIP": false},
            "perRoute": {"/login": {"rate": 0.5, "burst": 1, "enableUserID": true}}
        }"#;
        let config: RateLimitConfig = serde_json::from_str(json).unwrap();

        let default = config.default.as_ref().unwrap();
        assert_eq!(default.mode, LimitMode::Wait);
        assert!(!default.enable_ip);
        assert!(default.enable_route);

        let login = config.for_route("/login").unwrap();
        assert_eq!(login.mode, LimitMode::Allow);
        assert!(login.enable_user_id);
        assert!((login.rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_per_route_overrides_default() {
        let config = RateLimitConfig::with_default(RouteLimitConfig::new(100.0, 100))
            .route("/slow", RouteLimitConfig::new(1.0, 1));

        assert_eq!(config.for_route("/slow").unwrap().burst, 1);
        assert_eq!(config.for_route("/other").unwrap().burst, 100);
        assert!(RateLimitConfig::default().for_route("/any").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(RouteLimitConfig::new(1.0, 1).validate().is_ok());
        assert!(RouteLimitConfig::new(0.0, 1).validate().is_err());
        assert!(RouteLimitConfig::new(f64::NAN, 1).validate().is_err());
        assert!(RouteLimitConfig::new(1.0, 0).validate().is_err());
        assert!(RouteLimitConfig::new(1e-20, 1).validate().is_err());

        let config = RateLimitConfig::default().route("/x", RouteLimitConfig::new(-1.0, 1));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("/x"));
    }
}
