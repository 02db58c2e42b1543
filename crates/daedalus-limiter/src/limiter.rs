//! A single token bucket.

use std::num::NonZeroU32;

use daedalus_core::RequestContext;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{LimitMode, RouteLimitConfig};
use crate::error::{LimitError, LimitResult};

/// A token bucket plus the bookkeeping the manager needs for eviction.
pub struct RouteLimiter {
    bucket: DefaultDirectRateLimiter,
    mode: LimitMode,
    last_used: Mutex<Instant>,
}

impl std::fmt::Debug for RouteLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteLimiter")
            .field("mode", &self.mode)
            .field("last_used", &self.last_used())
            .finish_non_exhaustive()
    }
}

impl RouteLimiter {
    /// Builds a bucket holding `burst` tokens refilled at `rate` per second.
    pub fn new(config: &RouteLimitConfig) -> LimitResult<Self> {
        config.validate()?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| LimitError::invalid_config("burst must be at least 1"))?;
        let quota = Quota::with_period(config.refill_period()?)
            .ok_or_else(|| LimitError::invalid_config("rate is too high"))?
            .allow_burst(burst);

        Ok(Self {
            bucket: RateLimiter::direct(quota),
            mode: config.mode,
            last_used: Mutex::new(Instant::now()),
        })
    }

    /// Returns the configured mode.
    #[must_use]
    pub const fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Records a use now.
    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Returns when the bucket was last looked up.
    #[must_use]
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// Takes one token without waiting.
    pub fn try_acquire(&self) -> LimitResult<()> {
        self.bucket.check().map_err(|not_until| LimitError::Exceeded {
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        })
    }

    /// Takes one token according to the mode.
    ///
    /// In wait mode the wait ends early when `ctx` is cancelled or its
    /// deadline passes.
    pub async fn acquire(&self, ctx: &RequestContext) -> LimitResult<()> {
        match self.mode {
            LimitMode::Allow => self.try_acquire(),
            LimitMode::Wait => {
                if let Some(reason) = ctx.err() {
                    return Err(LimitError::Cancelled(reason));
                }
                tokio::select! {
                    () = self.bucket.until_ready() => Ok(()),
                    reason = ctx.done() => Err(LimitError::Cancelled(reason)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daedalus_core::ContextError;
    use std::time::Duration;

    #[test]
    fn test_burst_then_exceeded() {
        let limiter = RouteLimiter::new(&RouteLimitConfig::new(1.0, 3)).unwrap();

        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }
        match limiter.try_acquire() {
            Err(LimitError::Exceeded { retry_after }) => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_secs(1));
            }
            other => panic!("expected exceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RouteLimiter::new(&RouteLimitConfig::new(0.0, 1)).is_err());
        assert!(RouteLimiter::new(&RouteLimitConfig::new(1.0, 0)).is_err());
    }

    #[test]
    fn test_tiny_rate_rejected_without_panic() {
        let config = RouteLimitConfig::new(1e-20, 1);
        assert!(matches!(config.validate(), Err(LimitError::InvalidConfig(_))));
        assert!(matches!(
            RouteLimiter::new(&config),
            Err(LimitError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_mode_waits_for_refill() {
        let config = RouteLimitConfig::new(20.0, 1).with_mode(LimitMode::Wait);
        let limiter = RouteLimiter::new(&config).unwrap();
        let ctx = RequestContext::new();

        limiter.acquire(&ctx).await.unwrap();
        let started = std::time::Instant::now();
        limiter.acquire(&ctx).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_wait_mode_interrupted_by_cancel() {
        let config = RouteLimitConfig::new(0.1, 1).with_mode(LimitMode::Wait);
        let limiter = RouteLimiter::new(&config).unwrap();
        let ctx = RequestContext::new();
        limiter.acquire(&ctx).await.unwrap();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), limiter.acquire(&ctx))
            .await
            .expect("wait should be interrupted");
        assert_eq!(result, Err(LimitError::Cancelled(ContextError::Cancelled)));
    }

    #[tokio::test]
    async fn test_wait_mode_respects_deadline() {
        let config = RouteLimitConfig::new(0.1, 1).with_mode(LimitMode::Wait);
        let limiter = RouteLimiter::new(&config).unwrap();
        limiter.try_acquire().unwrap();

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let result = limiter.acquire(&ctx).await;
        assert_eq!(
            result,
            Err(LimitError::Cancelled(ContextError::DeadlineExceeded))
        );
    }
}
