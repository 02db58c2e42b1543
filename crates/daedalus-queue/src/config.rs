//! Queue consumer configuration (the `queue` config section).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};
use crate::pool::DEFAULT_POOL_SIZE;

/// Default sleep between polls of an empty queue.
pub const DEFAULT_EMPTY_SLEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Settings for a [`QueueServer`](crate::QueueServer).
///
/// `emptySleepInterval` accepts `"10ms"`, `"1s"`, `"2m"`, `"1h"`, `"500us"`
/// or a number of milliseconds.
///
/// # Example
///
/// ```rust
/// use daedalus_queue::QueueConfig;
/// use std::time::Duration;
///
/// let config: QueueConfig =
///     serde_json::from_str(r#"{"queueName":"orders","emptySleepInterval":"250ms"}"#).unwrap();
/// assert_eq!(config.pool_size, 1000);
/// assert_eq!(config.empty_sleep_interval, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueConfig {
    /// Name of the queue; also labels logs and metrics.
    pub queue_name: String,
    /// Maximum concurrent handler invocations.
    pub pool_size: usize,
    /// Sleep after an empty pop.
    #[serde(with = "interval_serde")]
    pub empty_sleep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: String::new(),
            pool_size: DEFAULT_POOL_SIZE,
            empty_sleep_interval: DEFAULT_EMPTY_SLEEP_INTERVAL,
        }
    }
}

impl QueueConfig {
    /// Creates a config for `queue_name` with defaults.
    #[must_use]
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Self::default()
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the empty-queue sleep.
    #[must_use]
    pub fn with_empty_sleep_interval(mut self, interval: Duration) -> Self {
        self.empty_sleep_interval = interval;
        self
    }

    /// Checks required fields.
    pub fn validate(&self) -> QueueResult<()> {
        if self.queue_name.trim().is_empty() {
            return Err(QueueError::invalid_config("queueName is required"));
        }
        if self.pool_size == 0 {
            return Err(QueueError::invalid_config("poolSize must be at least 1"));
        }
        Ok(())
    }
}

/// Parses `"10ms"`-style durations. A bare number is milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration `{s}`"))?;
    match unit.trim() {
        "ns" => Ok(Duration::from_nanos(n)),
        "us" | "µs" => Ok(Duration::from_micros(n)),
        "ms" | "" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("unknown duration unit `{other}` in `{s}`")),
    }
}

mod interval_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10ms").unwrap(), Duration::from_millis(10));
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500us").unwrap(), Duration::from_micros(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_millis(10));
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[test]
    fn test_interval_from_integer_millis() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"queueName":"q","poolSize":4,"emptySleepInterval":25}"#).unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.empty_sleep_interval, Duration::from_millis(25));
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = QueueConfig::default();
        assert_eq!(config.empty_sleep_interval, DEFAULT_EMPTY_SLEEP_INTERVAL);
        assert!(config.validate().is_err());

        assert!(QueueConfig::new("orders").validate().is_ok());
        assert!(QueueConfig::new("orders").with_pool_size(0).validate().is_err());
    }
}
