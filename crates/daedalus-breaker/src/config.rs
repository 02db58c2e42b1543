//! Breaker configuration and trip policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BreakerError, BreakerResult};
use crate::state::Counts;

/// Predicate deciding when a closed breaker opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    /// Trips once consecutive failures reach the threshold.
    ConsecutiveFailures(u32),
    /// Trips once enough requests were seen and the failure ratio is high enough.
    FailureRate {
        /// Requests needed before the ratio is considered
        min_requests: u32,
        /// Failure ratio in `[0, 1]`
        threshold: f64,
    },
}

impl TripPolicy {
    /// Returns true if `counts` should open the breaker.
    #[must_use]
    pub fn should_trip(&self, counts: &Counts) -> bool {
        match *self {
            Self::ConsecutiveFailures(n) => counts.consecutive_failures >= n,
            Self::FailureRate {
                min_requests,
                threshold,
            } => {
                counts.requests >= min_requests
                    && counts.requests > 0
                    && f64::from(counts.total_failures) / f64::from(counts.requests) >= threshold
            }
        }
    }
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self::FailureRate {
            min_requests: 10,
            threshold: 0.5,
        }
    }
}

/// Which policy a [`PolicyConfig`] selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    /// [`TripPolicy::ConsecutiveFailures`]
    ConsecutiveFailures,
    /// [`TripPolicy::FailureRate`]
    #[default]
    FailureRate,
}

/// Serializable form of a trip policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Selected policy
    #[serde(rename = "type")]
    pub kind: PolicyKind,
    /// Threshold for the consecutive-failures policy
    pub consecutive_failures: u32,
    /// Minimum requests for the failure-rate policy
    pub min_requests: u32,
    /// Ratio for the failure-rate policy
    pub failure_rate_threshold: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::FailureRate,
            consecutive_failures: 5,
            min_requests: 10,
            failure_rate_threshold: 0.5,
        }
    }
}

impl PolicyConfig {
    /// Resolves the selected policy.
    #[must_use]
    pub fn policy(&self) -> TripPolicy {
        match self.kind {
            PolicyKind::ConsecutiveFailures => {
                TripPolicy::ConsecutiveFailures(self.consecutive_failures)
            }
            PolicyKind::FailureRate => TripPolicy::FailureRate {
                min_requests: self.min_requests,
                threshold: self.failure_rate_threshold,
            },
        }
    }
}

/// Settings shared by every breaker a manager creates.
///
/// `interval` and `timeout` are whole seconds on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerConfig {
    /// Trip policy
    pub policy: PolicyConfig,
    /// Closed-state counter reset period in seconds; 0 never resets
    pub interval: u64,
    /// Open-state duration in seconds before probing
    pub timeout: u64,
    /// Probes allowed in half-open, and successes needed to close
    pub max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            interval: 60,
            timeout: 60,
            max_requests: 1,
        }
    }
}

impl BreakerConfig {
    /// Creates a config that trips after `n` consecutive failures.
    #[must_use]
    pub fn consecutive_failures(n: u32) -> Self {
        Self {
            policy: PolicyConfig {
                kind: PolicyKind::ConsecutiveFailures,
                consecutive_failures: n,
                ..PolicyConfig::default()
            },
            ..Self::default()
        }
    }

    /// Sets the open-state timeout in seconds.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = secs;
        self
    }

    /// Sets the half-open probe count.
    #[must_use]
    pub fn with_max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Returns the closed-state reset period, if any.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        (self.interval > 0).then(|| Duration::from_secs(self.interval))
    }

    /// Returns the open-state timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Returns the half-open probe count, at least one.
    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests.max(1)
    }

    /// Checks that the failure-rate threshold lies in `[0, 1]`.
    pub fn validate(&self) -> BreakerResult<()> {
        let threshold = self.policy.failure_rate_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(BreakerError::InvalidConfig(format!(
                "failureRateThreshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(())
    }
}
