//! Building the middleware chain from [`MiddlewareConfig`].
//!
//! The stage order is fixed: auth, circuit breaker, rate limit, metrics,
//! logging, recovery, timeout. Each stage wraps everything after it, so a
//! rejection by an early stage never reaches the later ones.

use std::sync::Arc;
use std::time::Duration;

use daedalus_breaker::{BreakerManager, State};
use daedalus_http::{Middleware, Router};
use daedalus_limiter::LimiterManager;

use crate::auth::{AuthMiddleware, Authenticator};
use crate::breaker::BreakerMiddleware;
use crate::config::MiddlewareConfig;
use crate::error::MiddlewareResult;
use crate::logging::LoggingMiddleware;
use crate::metrics::MetricsMiddleware;
use crate::rate_limit::RateLimitMiddleware;
use crate::recovery::RecoveryMiddleware;
use crate::timeout::TimeoutMiddleware;

/// The policies a config enables, shared by the HTTP and gRPC surfaces.
#[derive(Debug)]
pub(crate) struct Policies {
    pub(crate) auth: Option<Authenticator>,
    pub(crate) breakers: Option<Arc<BreakerManager>>,
    pub(crate) limiters: Option<Arc<LimiterManager>>,
    pub(crate) metrics: bool,
    pub(crate) logging: bool,
    pub(crate) recovery: bool,
    pub(crate) timeout: Option<Duration>,
}

impl Policies {
    pub(crate) fn from_config(config: &MiddlewareConfig) -> MiddlewareResult<Self> {
        config.validate()?;

        let auth = config.auth.as_ref().map(Authenticator::new).transpose()?;

        let breakers = config.circuit_breaker.as_ref().map(|breaker| {
            Arc::new(BreakerManager::new(breaker.clone()).with_state_change(Arc::new(
                |name: &str, from: State, to: State| {
                    tracing::warn!(breaker = %name, from = ?from, to = ?to, "circuit breaker state changed");
                },
            )))
        });

        let limiters = config.rate_limit.as_ref().map(|rate_limit| {
            let manager = LimiterManager::new(rate_limit.clone());
            if tokio::runtime::Handle::try_current().is_ok() {
                let _evictor = manager.start_evictor();
            }
            manager
        });

        Ok(Self {
            auth,
            breakers,
            limiters,
            metrics: config.enable_metrics,
            logging: config.enable_logging,
            recovery: config.enable_recovery,
            timeout: (config.timeout_seconds > 0).then(|| Duration::from_secs(config.timeout_seconds)),
        })
    }

    fn into_http(self) -> Vec<Arc<dyn Middleware>> {
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::with_capacity(7);
        if let Some(auth) = self.auth {
            chain.push(Arc::new(AuthMiddleware::new(auth)));
        }
        if let Some(breakers) = self.breakers {
            chain.push(Arc::new(BreakerMiddleware::new(breakers)));
        }
        if let Some(limiters) = self.limiters {
            chain.push(Arc::new(RateLimitMiddleware::new(limiters)));
        }
        if self.metrics {
            chain.push(Arc::new(MetricsMiddleware));
        }
        if self.logging {
            chain.push(Arc::new(LoggingMiddleware));
        }
        if self.recovery {
            chain.push(Arc::new(RecoveryMiddleware));
        }
        if let Some(timeout) = self.timeout {
            chain.push(Arc::new(TimeoutMiddleware::new(timeout)));
        }
        chain
    }
}

/// Builds the HTTP middleware chain, outermost first.
///
/// When called inside a tokio runtime, the rate limiter's idle-bucket
/// evictor is started; it stops once the chain is dropped.
///
/// # Example
///
/// ```rust
/// use daedalus_middleware::{build_http, MiddlewareConfig};
///
/// let chain = build_http(&MiddlewareConfig::default()).unwrap();
/// let names: Vec<_> = chain.iter().map(|m| m.name()).collect();
/// assert_eq!(names, ["logging", "recovery", "timeout"]);
/// ```
pub fn build_http(config: &MiddlewareConfig) -> MiddlewareResult<Vec<Arc<dyn Middleware>>> {
    Ok(Policies::from_config(config)?.into_http())
}

/// Builds the chain for `config` and installs it as global middleware on
/// `router`.
pub fn install(router: &mut Router, config: &MiddlewareConfig) -> MiddlewareResult<()> {
    for middleware in build_http(config)? {
        router.use_shared(middleware);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use daedalus_breaker::BreakerConfig;
    use daedalus_limiter::{RateLimitConfig, RouteLimitConfig};

    #[test]
    fn test_full_chain_order() {
        let config = MiddlewareConfig {
            auth: Some(AuthConfig::with_secret("k")),
            rate_limit: Some(RateLimitConfig::with_default(RouteLimitConfig::new(10.0, 10))),
            circuit_breaker: Some(BreakerConfig::default()),
            enable_metrics: true,
            ..MiddlewareConfig::default()
        };
        let chain = build_http(&config).unwrap();
        let names: Vec<_> = chain.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            ["auth", "circuit_breaker", "rate_limit", "metrics", "logging", "recovery", "timeout"]
        );
    }

    #[test]
    fn test_disabled_chain_is_empty() {
        assert!(build_http(&MiddlewareConfig::disabled()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MiddlewareConfig {
            rate_limit: Some(RateLimitConfig::with_default(RouteLimitConfig::new(0.0, 1))),
            ..MiddlewareConfig::default()
        };
        assert!(build_http(&config).is_err());
    }
}
