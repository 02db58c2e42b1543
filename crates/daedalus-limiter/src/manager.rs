//! Per-key limiter cache with idle eviction.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use daedalus_core::{RequestContext, ShutdownSignal};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{RateLimitConfig, RouteLimitConfig};
use crate::error::LimitResult;
use crate::key::{build_key, LimitSubject};
use crate::limiter::RouteLimiter;

/// Default interval between eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default idle time after which a bucket is evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Owns one [`RouteLimiter`] per key.
///
/// # Example
///
/// ```rust
/// use daedalus_core::RequestContext;
/// use daedalus_limiter::{LimitSubject, LimiterManager, RateLimitConfig, RouteLimitConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = RateLimitConfig::with_default(RouteLimitConfig::new(1.0, 1));
/// let manager = LimiterManager::new(config);
/// let ctx = RequestContext::new();
/// let subject = LimitSubject::new("/t", "1.1.1.1", None);
///
/// assert!(manager.check(&subject, &ctx).await.is_ok());
/// assert!(manager.check(&subject, &ctx).await.is_err());
/// # }
/// ```
#[derive(Debug)]
pub struct LimiterManager {
    config: RateLimitConfig,
    limiters: RwLock<HashMap<String, Arc<RouteLimiter>>>,
    ttl: Duration,
    sweep_interval: Duration,
    shutdown: ShutdownSignal,
}

/// Builder for [`LimiterManager`].
#[derive(Debug)]
pub struct LimiterManagerBuilder {
    config: RateLimitConfig,
    ttl: Duration,
    sweep_interval: Duration,
}

impl LimiterManagerBuilder {
    /// Sets the idle time after which a bucket is evicted.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the interval between eviction sweeps.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Builds the manager without starting the evictor.
    #[must_use]
    pub fn build(self) -> Arc<LimiterManager> {
        Arc::new(LimiterManager {
            config: self.config,
            limiters: RwLock::new(HashMap::new()),
            ttl: self.ttl,
            sweep_interval: self.sweep_interval,
            shutdown: ShutdownSignal::new(),
        })
    }
}

impl LimiterManager {
    /// Creates a builder with the default TTL and sweep interval.
    #[must_use]
    pub fn builder(config: RateLimitConfig) -> LimiterManagerBuilder {
        LimiterManagerBuilder {
            config,
            ttl: DEFAULT_IDLE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Creates a manager with default eviction settings.
    ///
    /// The evictor is not running until [`LimiterManager::start_evictor`].
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Arc<Self> {
        Self::builder(config).build()
    }

    /// Returns the configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns the bucket settings for `route`, if any apply.
    #[must_use]
    pub fn route_config(&self, route: &str) -> Option<&RouteLimitConfig> {
        self.config.for_route(route)
    }

    /// Returns the limiter for `key`, creating it from `config` on first use.
    ///
    /// Concurrent callers for the same key always receive the same instance.
    pub fn get_or_create(
        &self,
        key: &str,
        config: &RouteLimitConfig,
    ) -> LimitResult<Arc<RouteLimiter>> {
        if let Some(limiter) = self.limiters.read().get(key) {
            limiter.touch();
            return Ok(Arc::clone(limiter));
        }

        let mut limiters = self.limiters.write();
        if let Some(limiter) = limiters.get(key) {
            limiter.touch();
            return Ok(Arc::clone(limiter));
        }
        let limiter = Arc::new(RouteLimiter::new(config)?);
        limiters.insert(key.to_string(), Arc::clone(&limiter));
        tracing::debug!(key = %key, rate = config.rate, burst = config.burst, "rate limiter created");
        Ok(limiter)
    }

    /// Applies the limit for `subject`.
    ///
    /// Routes with neither a per-route nor a default entry are allowed.
    pub async fn check(&self, subject: &LimitSubject<'_>, ctx: &RequestContext) -> LimitResult<()> {
        let Some(config) = self.route_config(subject.route) else {
            return Ok(());
        };
        let key = build_key(config, subject);
        let limiter = self.get_or_create(&key, config)?;
        limiter.acquire(ctx).await
    }

    /// Removes buckets idle for longer than the TTL. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut limiters = self.limiters.write();
        let before = limiters.len();
        limiters.retain(|_, limiter| now.saturating_duration_since(limiter.last_used()) <= self.ttl);
        before - limiters.len()
    }

    /// Spawns the background evictor.
    ///
    /// The task holds a weak reference, so it ends when the manager is
    /// dropped or [`LimiterManager::stop`] is called.
    pub fn start_evictor(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        let evicted = manager.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = manager.len(), "evicted idle rate limiters");
                        }
                    }
                }
            }
            tracing::debug!("rate limiter evictor stopped");
        })
    }

    /// Stops the evictor. Repeated calls are no-ops.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Returns the number of live buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.read().len()
    }

    /// Returns true when no bucket exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.read().is_empty()
    }

    /// Returns true if a bucket exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.limiters.read().contains_key(key)
    }
}

impl Drop for LimiterManager {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
