//! Structured access log.

use daedalus_http::{BoxFuture, Context, HandlerResult, Middleware, Next};
use tokio::time::Instant;

/// Emits one `tracing` event per request.
///
/// Server errors log at `error`, client errors at `warn`, everything else
/// at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run(&mut *ctx).await;

            let status = ctx.outcome_status(&result);
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            let request_ctx = ctx.request_context();
            let client_ip = ctx.client_ip().unwrap_or_default();

            macro_rules! access_log {
                ($level:ident) => {
                    tracing::$level!(
                        method = %ctx.method(),
                        path = %ctx.full_path(),
                        status = status.as_u16(),
                        latency_ms,
                        trace_id = %request_ctx.trace_id(),
                        client_ip = %client_ip,
                        "request completed"
                    )
                };
            }

            if status.is_server_error() {
                access_log!(error);
            } else if status.is_client_error() {
                access_log!(warn);
            } else {
                access_log!(info);
            }
            result
        })
    }
}
