//! Per-request deadline.

use std::time::Duration;

use daedalus_core::DaedalusError;
use daedalus_http::{BoxFuture, Context, HandlerResult, HttpError, Middleware, Next};
use tokio::time::Instant;

/// Binds a deadline on the request context and races the chain against it.
///
/// When the deadline passes the context is cancelled, the downstream
/// future is dropped and the request fails with 504.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let mut request_ctx = ctx.request_context();
            request_ctx.set_deadline(Instant::now() + self.timeout);
            let deadline = request_ctx.deadline().unwrap_or_else(Instant::now);
            ctx.set_request_context(request_ctx.clone());

            match tokio::time::timeout_at(deadline, next.run(&mut *ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    request_ctx.cancel();
                    tracing::warn!(
                        path = %ctx.full_path(),
                        trace_id = %request_ctx.trace_id(),
                        timeout_ms = self.timeout.as_millis(),
                        "request deadline exceeded"
                    );
                    Err(HttpError::from(DaedalusError::timeout("request deadline exceeded")))
                }
            }
        })
    }
}
