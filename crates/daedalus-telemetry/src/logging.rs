//! Structured logging for Daedalus.
//!
//! [`init_logging`] installs a global `tracing` subscriber built from a
//! [`LoggerConfig`]: an `EnvFilter`, then one fmt layer per output. Stdout
//! uses JSON for the structured backends (`zap`, `zerolog`) and
//! human-readable text otherwise. The file output always writes JSON
//! through a [`RotatingWriter`].
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_telemetry::{init_logging, LoggerConfig};
//!
//! init_logging(&LoggerConfig::default())?;
//! tracing::info!(path = "/users/:id", status = 200, "request completed");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::rotation::{RotatePolicy, RotatingWriter};
use crate::TelemetryResult;

/// Severity threshold, spelled the way config files spell it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug and above.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
    /// Treated as [`LogLevel::Error`].
    Panic,
    /// Treated as [`LogLevel::Error`].
    Fatal,
}

impl LogLevel {
    /// Returns the `EnvFilter` directive for this level.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Panic | Self::Fatal => "error",
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    Stdout,
    /// The file named by [`FileOutputConfig::path`].
    File,
}

/// File output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileOutputConfig {
    /// Active log file path.
    pub path: String,
    /// Rotation trigger.
    pub rotate_policy: RotatePolicy,
    /// Size limit in MiB for [`RotatePolicy::Size`].
    pub max_size: u64,
    /// Gzip rotated files.
    pub compress: bool,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            rotate_policy: RotatePolicy::Daily,
            max_size: 100,
            compress: false,
        }
    }
}

/// The `logger` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerConfig {
    /// Minimum level. `RUST_LOG` overrides it when set.
    pub level: LogLevel,
    /// Backend name. `zap` and `zerolog` select JSON on stdout.
    pub backend: String,
    /// Enabled outputs.
    pub outputs: Vec<LogOutput>,
    /// Required when `outputs` contains [`LogOutput::File`].
    pub file_output: Option<FileOutputConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            backend: String::new(),
            outputs: vec![LogOutput::Stdout],
            file_output: None,
        }
    }
}

impl LoggerConfig {
    /// Returns true when stdout lines are JSON.
    #[must_use]
    pub fn json_stdout(&self) -> bool {
        matches!(self.backend.as_str(), "zap" | "zerolog")
    }

    /// Checks that a file output has a path.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] when `file` is listed
    /// without `fileOutput.path`.
    pub fn validate(&self) -> TelemetryResult<()> {
        if self.outputs.contains(&LogOutput::File) {
            let has_path = self
                .file_output
                .as_ref()
                .is_some_and(|file| !file.path.is_empty());
            if !has_path {
                return Err(TelemetryError::InvalidConfig(
                    "fileOutput.path is required when outputs contains \"file\"".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Opens the rotating writer for the file output, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the file cannot be opened.
    pub fn file_writer(&self) -> TelemetryResult<Option<RotatingWriter>> {
        self.validate()?;
        if !self.outputs.contains(&LogOutput::File) {
            return Ok(None);
        }
        let Some(file) = &self.file_output else {
            return Ok(None);
        };
        let writer =
            RotatingWriter::open(&file.path, file.rotate_policy, file.max_size, file.compress)?;
        Ok(Some(writer))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for a file output without a
/// path, [`TelemetryError::Io`] when the log file cannot be opened, and
/// [`TelemetryError::LoggingInit`] when a subscriber is already installed.
pub fn init_logging(config: &LoggerConfig) -> TelemetryResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_directive()))
        .map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    if config.outputs.contains(&LogOutput::Stdout) {
        let layer = if config.json_stdout() {
            tracing_subscriber::fmt::layer().json().with_target(true).boxed()
        } else {
            tracing_subscriber::fmt::layer().with_target(true).boxed()
        };
        layers.push(layer);
    }

    if let Some(writer) = config.file_writer()? {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .boxed();
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Standard log field names.
pub mod fields {
    /// Trace ID field name.
    pub const TRACE_ID: &str = "trace_id";

    /// HTTP method field name.
    pub const METHOD: &str = "method";

    /// Route pattern field name.
    pub const PATH: &str = "path";

    /// Response status field name.
    pub const STATUS: &str = "status";

    /// Latency field name (in milliseconds).
    pub const LATENCY_MS: &str = "latency_ms";

    /// Client IP field name.
    pub const CLIENT_IP: &str = "client_ip";

    /// Server or queue name field name.
    pub const SERVER: &str = "server";
}
