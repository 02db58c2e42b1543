//! The root configuration type.

use daedalus_queue::QueueConfig;
use daedalus_telemetry::LoggerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GrpcSection, HttpSection, MysqlSection, RedisSection};

/// Complete service configuration.
///
/// Every section is optional. A missing `logger` falls back to defaults;
/// other missing sections stay `None`, which tells the application not to
/// build the corresponding server or connector.
///
/// # Example
///
/// ```
/// use daedalus_config::Config;
///
/// let config = Config::from_toml(r#"
///     [http]
///     addr = "127.0.0.1:3000"
///
///     [queue]
///     queueName = "orders"
///     emptySleepInterval = "50ms"
///
///     [custom]
///     greeting = "hi"
/// "#).unwrap();
///
/// assert_eq!(config.http.as_ref().unwrap().server.addr, "127.0.0.1:3000");
/// assert_eq!(config.queue.as_ref().unwrap().queue_name, "orders");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Logging setup.
    pub logger: LoggerConfig,
    /// HTTP server.
    pub http: Option<HttpSection>,
    /// gRPC middleware surface.
    pub grpc: Option<GrpcSection>,
    /// Queue consumer.
    pub queue: Option<QueueConfig>,
    /// MySQL connection.
    pub mysql: Option<MysqlSection>,
    /// Redis connection.
    pub redis: Option<RedisSection>,
    /// Application-defined settings, see [`Config::custom`].
    pub custom: Option<serde_json::Value>,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// - `queue.queueName` is non-empty when a `queue` section exists
    /// - `logger.fileOutput.path` is set when outputs contain `"file"`
    /// - every rate-limit entry has `rate > 0` and `burst >= 1`
    /// - every `failureRateThreshold` is within `[0, 1]`
    pub fn validate(&self) -> ConfigResult<()> {
        self.logger
            .validate()
            .map_err(|e| ConfigError::validation_error(format!("logger: {e}")))?;

        if let Some(http) = &self.http {
            http.middlewares
                .validate()
                .map_err(|e| ConfigError::validation_error(format!("http.middlewares: {e}")))?;
        }
        if let Some(grpc) = &self.grpc {
            grpc.middlewares
                .validate()
                .map_err(|e| ConfigError::validation_error(format!("grpc.middlewares: {e}")))?;
        }
        if let Some(queue) = &self.queue {
            queue
                .validate()
                .map_err(|e| ConfigError::validation_error(format!("queue: {e}")))?;
        }
        Ok(())
    }

    /// Deserializes the `custom` subtree into `T`.
    ///
    /// ```
    /// use daedalus_config::Config;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Features {
    ///     beta: bool,
    /// }
    ///
    /// let config = Config::from_json(r#"{"custom":{"beta":true}}"#).unwrap();
    /// assert!(config.custom::<Features>().unwrap().beta);
    /// ```
    pub fn custom<T: DeserializeOwned>(&self) -> ConfigResult<T> {
        let value = self.custom.clone().ok_or(ConfigError::MissingSection("custom"))?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document() {
        let config = Config::from_toml("").unwrap();
        assert!(config.http.is_none());
        assert!(config.queue.is_none());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_full_document() {
        let config = Config::from_toml(
            r#"
            [logger]
            level = "DEBUG"
            outputs = ["stdout"]

            [http]
            addr = ":8080"
            mode = "release"
            readTimeout = 10

            [http.middlewares]
            enableMetrics = true
            timeoutSeconds = 5

            [http.middlewares.rateLimit.default]
            mode = "wait"
            rate = 2.0
            burst = 4

            [http.middlewares.circuitBreaker.policy]
            type = "consecutiveFailures"
            consecutiveFailures = 3

            [grpc]
            addr = ":9000"
            reflection = true

            [queue]
            queueName = "jobs"
            poolSize = 8
            emptySleepInterval = 20

            [mysql]
            dataSourceName = "user:pw@tcp(db:3306)/app"

            [redis]
            addr = "cache:6379"
            db = 1
            "#,
        )
        .unwrap();

        let http = config.http.as_ref().unwrap();
        assert_eq!(http.server.read_timeout, 10);
        assert_eq!(http.middlewares.timeout_seconds, 5);
        assert!(http.middlewares.rate_limit.as_ref().unwrap().default.is_some());
        assert!(http.middlewares.circuit_breaker.is_some());

        let queue = config.queue.as_ref().unwrap();
        assert_eq!(queue.pool_size, 8);
        assert_eq!(queue.empty_sleep_interval, Duration::from_millis(20));

        assert!(config.grpc.as_ref().unwrap().reflection);
        assert_eq!(config.redis.as_ref().unwrap().db, 1);
        assert!(config.mysql.is_some());
    }

    #[test]
    fn test_validation_failures() {
        let missing_queue_name = Config::from_json(r#"{"queue":{"poolSize":4}}"#).unwrap_err();
        assert!(missing_queue_name.to_string().contains("queueName"));

        let file_without_path = Config::from_json(r#"{"logger":{"outputs":["file"]}}"#).unwrap_err();
        assert!(file_without_path.to_string().contains("fileOutput.path"));

        let zero_rate = Config::from_json(
            r#"{"http":{"middlewares":{"rateLimit":{"default":{"rate":0,"burst":1}}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(zero_rate, ConfigError::ValidationError(_)));

        let bad_threshold = Config::from_json(
            r#"{"grpc":{"middlewares":{"circuitBreaker":{"policy":{"failureRateThreshold":1.5}}}}}"#,
        )
        .unwrap_err();
        assert!(bad_threshold.to_string().contains("failureRateThreshold"));
    }

    #[test]
    fn test_unknown_enum_is_rejected() {
        assert!(Config::from_json(r#"{"logger":{"level":"LOUD"}}"#).is_err());
    }

    #[test]
    fn test_custom_section() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Greeting {
            text: String,
            times: u32,
        }

        let config = Config::from_toml("[custom]\ntext = \"hello\"\ntimes = 3\n").unwrap();
        assert_eq!(
            config.custom::<Greeting>().unwrap(),
            Greeting {
                text: "hello".to_string(),
                times: 3
            }
        );

        let missing = Config::default().custom::<Greeting>().unwrap_err();
        assert!(matches!(missing, ConfigError::MissingSection("custom")));
    }
}
