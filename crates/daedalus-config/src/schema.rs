//! Configuration schema types.
//!
//! One struct per top-level section. Sections that belong to another crate
//! (`logger`, `queue`, the listener part of `http` and every `middlewares`
//! block) reuse that crate's config type so there is a single definition.

use daedalus_http::HttpServerConfig;
use daedalus_middleware::MiddlewareConfig;
use serde::{Deserialize, Serialize};

/// Default gRPC listen address.
pub const DEFAULT_GRPC_ADDR: &str = "0.0.0.0:9090";

/// Default Redis address.
pub const DEFAULT_REDIS_ADDR: &str = "127.0.0.1:6379";

/// Run mode of the HTTP surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Verbose logging of route registration.
    #[default]
    Debug,
    /// Production.
    Release,
    /// Tests.
    Test,
}

/// HTTP engine selection. Only hyper is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkType {
    /// The hyper 1.x engine.
    #[default]
    Hyper,
}

/// The `http` section.
///
/// # Example
///
/// ```
/// use daedalus_config::{HttpSection, Mode};
///
/// let http: HttpSection = serde_json::from_str(
///     r#"{"addr":":8081","mode":"release","readTimeout":5,"middlewares":{"enableMetrics":true}}"#,
/// )
/// .unwrap();
/// assert_eq!(http.server.addr, ":8081");
/// assert_eq!(http.server.read_timeout, 5);
/// assert_eq!(http.mode, Mode::Release);
/// assert!(http.middlewares.enable_metrics);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSection {
    /// Listener settings: `addr`, `readTimeout`, `writeTimeout`, `gracePeriod`.
    #[serde(flatten)]
    pub server: HttpServerConfig,
    /// Run mode.
    pub mode: Mode,
    /// Carried for compatibility; no profiler is mounted.
    pub pprof_enabled: bool,
    /// Middleware chain for every route.
    pub middlewares: MiddlewareConfig,
    /// Engine selection.
    pub framework_type: FrameworkType,
}

/// The `grpc` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrpcSection {
    /// Listen address.
    pub addr: String,
    /// Per-call timeout in seconds, 0 disables it.
    pub timeout: u64,
    /// Whether the service registers server reflection.
    pub reflection: bool,
    /// Middleware applied by the gRPC layer.
    pub middlewares: MiddlewareConfig,
}

impl Default for GrpcSection {
    fn default() -> Self {
        Self {
            addr: DEFAULT_GRPC_ADDR.to_string(),
            timeout: 0,
            reflection: false,
            middlewares: MiddlewareConfig::default(),
        }
    }
}

impl GrpcSection {
    /// Returns the middleware config with `timeout` folded in.
    ///
    /// A non-zero section timeout wins over `middlewares.timeoutSeconds`.
    #[must_use]
    pub fn effective_middlewares(&self) -> MiddlewareConfig {
        let mut middlewares = self.middlewares.clone();
        if self.timeout > 0 {
            middlewares.timeout_seconds = self.timeout;
        }
        middlewares
    }
}

/// The `mysql` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MysqlSection {
    /// Driver data source name.
    pub data_source_name: String,
}

/// TLS settings for the Redis connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisTlsConfig {
    /// Connect over TLS.
    pub enabled: bool,
    /// Expected server name.
    pub server_name: String,
    /// Minimum TLS version, e.g. `"1.2"`.
    #[serde(rename = "versionTLS")]
    pub version_tls: String,
    /// Skip certificate verification.
    pub insecure_skip_verify: bool,
}

/// The `redis` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSection {
    /// `host:port`.
    pub addr: String,
    /// Password, empty for none.
    pub password: String,
    /// Database index.
    pub db: i64,
    /// TLS settings.
    pub tls: RedisTlsConfig,
    /// Carried for compatibility; no client hooks are installed.
    pub register_hook_driver: bool,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            addr: DEFAULT_REDIS_ADDR.to_string(),
            password: String::new(),
            db: 0,
            tls: RedisTlsConfig::default(),
            register_hook_driver: false,
        }
    }
}

impl RedisSection {
    /// Builds a connection URL.
    ///
    /// ```
    /// use daedalus_config::RedisSection;
    ///
    /// let mut redis = RedisSection::default();
    /// redis.password = "pw".to_string();
    /// redis.db = 2;
    /// assert_eq!(redis.url(), "redis://:pw@127.0.0.1:6379/2");
    ///
    /// redis.tls.enabled = true;
    /// redis.tls.insecure_skip_verify = true;
    /// assert_eq!(redis.url(), "rediss://:pw@127.0.0.1:6379/2#insecure");
    /// ```
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.tls.enabled { "rediss" } else { "redis" };
        let auth = if self.password.is_empty() {
            String::new()
        } else {
            format!(":{}@", self.password)
        };
        let insecure = if self.tls.enabled && self.tls.insecure_skip_verify {
            "#insecure"
        } else {
            ""
        };
        format!("{scheme}://{auth}{}/{}{insecure}", self.addr, self.db)
    }
}
