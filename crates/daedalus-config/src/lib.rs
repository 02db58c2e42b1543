//! # Daedalus Config
//!
//! Layered configuration for Daedalus services.
//!
//! Sources are merged in order, later layers winning key by key:
//!
//! 1. Built-in defaults
//! 2. A TOML or JSON file
//! 3. A `.env` file in the working directory (existing variables win)
//! 4. `DAEDALUS__SECTION__KEY` environment variables
//!
//! The merged document is deserialized into [`Config`] and validated.
//! [`ConfigHolder`] keeps the active config and can reload it when the file
//! changes.
//!
//! # Example
//!
//! ```no_run
//! use daedalus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), daedalus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("config.toml")?
//!     .with_env_prefix("DAEDALUS")
//!     .load()?;
//!
//! if let Some(http) = &config.http {
//!     println!("HTTP listens on {}", http.server.addr);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # File Format
//!
//! ```toml
//! [logger]
//! level = "INFO"
//! outputs = ["stdout"]
//!
//! [http]
//! addr = ":8080"
//! mode = "release"
//! readTimeout = 10
//!
//! [http.middlewares]
//! enableMetrics = true
//! timeoutSeconds = 5
//!
//! [queue]
//! queueName = "orders"
//! poolSize = 100
//! emptySleepInterval = "10ms"
//!
//! [redis]
//! addr = "127.0.0.1:6379"
//! ```
//!
//! # Environment Overrides
//!
//! Keys are separated by a double underscore and matched case-insensitively,
//! ignoring single underscores, so both spellings below reach
//! `queue.poolSize`:
//!
//! - `DAEDALUS__QUEUE__POOL_SIZE=32`
//! - `DAEDALUS__QUEUE__POOLSIZE=32`
//!
//! Values are typed by the field they override; `DAEDALUS__HTTP__ADDR=8080`
//! stays a string.

#![doc(html_root_url = "https://docs.rs/daedalus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;
mod watcher;

pub use config::Config;
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, must_load, ConfigLoader, Format, ENV_PREFIX};
pub use schema::{
    FrameworkType, GrpcSection, HttpSection, Mode, MysqlSection, RedisSection, RedisTlsConfig,
    DEFAULT_GRPC_ADDR, DEFAULT_REDIS_ADDR,
};
pub use watcher::{ChangeCallback, ConfigHolder, ConfigWatcher, WatchOptions, DEFAULT_DEBOUNCE};
