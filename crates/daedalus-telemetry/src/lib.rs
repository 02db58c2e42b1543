//! # Daedalus Telemetry
//!
//! Logging and metrics setup for Daedalus services.
//!
//! - **Logging**: a global `tracing` subscriber with stdout and rotating
//!   file outputs, configured by the `logger` config section
//! - **Metrics**: Prometheus-format request and queue metrics via the
//!   `metrics` crate
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_telemetry::{init_logging, init_metrics, render_metrics, LoggerConfig};
//!
//! init_logging(&LoggerConfig::default())?;
//! init_metrics()?;
//!
//! // Expose on a /metrics route:
//! let body = render_metrics().unwrap_or_default();
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;
mod rotation;

pub use error::TelemetryError;
pub use logging::{init_logging, FileOutputConfig, LogLevel, LogOutput, LoggerConfig};
pub use metrics::{
    init_metrics, record_grpc_request, record_http_request, record_queue_message, render_metrics, QueueOutcome,
};
pub use rotation::{RotatePolicy, RotatingWriter};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
