//! Request duration metrics.

use daedalus_http::{BoxFuture, Context, HandlerResult, Middleware, Next};
use tokio::time::Instant;

/// Records `http_request_duration_seconds` by method, route pattern and
/// status.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMiddleware;

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run(&mut *ctx).await;
            daedalus_telemetry::record_http_request(
                ctx.method().as_str(),
                ctx.full_path(),
                ctx.outcome_status(&result).as_u16(),
                started.elapsed(),
            );
            result
        })
    }
}
