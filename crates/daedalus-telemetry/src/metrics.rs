//! Prometheus request metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `http_request_duration_seconds` | Histogram | `method`, `path`, `status` |
//! | `http_requests_total` | Counter | `method`, `path`, `status` |
//! | `grpc_request_duration_seconds` | Histogram | `method`, `code` |
//! | `queue_messages_total` | Counter | `queue`, `outcome` |
//!
//! Recording goes through the `metrics` facade, so the functions are
//! no-ops until a recorder is installed.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Request duration histogram name.
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";

/// Request counter name.
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// gRPC call duration histogram name.
pub const GRPC_REQUEST_DURATION: &str = "grpc_request_duration_seconds";

/// Queue message counter name.
pub const QUEUE_MESSAGES_TOTAL: &str = "queue_messages_total";

/// Histogram buckets for request duration: 5ms to 10s.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder.
///
/// Calling it again after a successful install is a no-op.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] when another recorder is
/// already installed.
pub fn init_metrics() -> TelemetryResult<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(GRPC_REQUEST_DURATION.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_histogram!(HTTP_REQUEST_DURATION, "HTTP request duration in seconds");
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests");
    describe_histogram!(GRPC_REQUEST_DURATION, "gRPC call duration in seconds");
    describe_counter!(
        QUEUE_MESSAGES_TOTAL,
        "Queue messages processed, by outcome"
    );
}

/// Records one completed HTTP request.
///
/// `path` should be the route pattern, not the concrete path.
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status = status.to_string();
    histogram!(
        HTTP_REQUEST_DURATION,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.clone()
    )
    .record(duration.as_secs_f64());
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Records one completed gRPC call.
///
/// `method` is the full method path, e.g. `/pkg.Service/Method`.
pub fn record_grpc_request(method: &str, code: u8, duration: Duration) {
    histogram!(
        GRPC_REQUEST_DURATION,
        "method" => method.to_string(),
        "code" => code.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Outcome of one queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// The handler returned Ok.
    Handled,
    /// The handler returned an error.
    Failed,
    /// The payload could not be decoded.
    DecodeError,
    /// The worker pool refused the task.
    Rejected,
}

impl QueueOutcome {
    /// Returns the label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Failed => "failed",
            Self::DecodeError => "decode_error",
            Self::Rejected => "rejected",
        }
    }
}

/// Counts one queue message.
pub fn record_queue_message(queue: &str, outcome: QueueOutcome) {
    counter!(
        QUEUE_MESSAGES_TOTAL,
        "queue" => queue.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}
