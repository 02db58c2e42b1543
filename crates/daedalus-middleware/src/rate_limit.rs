//! Rate limiting per route, client IP and user.

use std::sync::Arc;

use daedalus_core::DaedalusError;
use daedalus_http::{BoxFuture, Context, HandlerResult, HttpError, Middleware, Next};
use daedalus_limiter::{LimitSubject, LimiterManager};

/// HTTP rate limit stage.
///
/// Exceeding the bucket in allow mode returns 429 with `Retry-After`; a
/// wait-mode acquisition interrupted by the request context returns 429
/// as well.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiters: Arc<LimiterManager>,
}

impl RateLimitMiddleware {
    /// Creates the stage over a shared limiter manager.
    #[must_use]
    pub const fn new(limiters: Arc<LimiterManager>) -> Self {
        Self { limiters }
    }

    /// Returns the limiter manager.
    #[must_use]
    pub fn limiters(&self) -> &Arc<LimiterManager> {
        &self.limiters
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let request_ctx = ctx.request_context();
            let ip = ctx.client_ip().unwrap_or_default();
            let subject = LimitSubject::new(ctx.full_path(), &ip, request_ctx.user_id());

            if let Err(limited) = self.limiters.check(&subject, &request_ctx).await {
                tracing::info!(route = %subject.route, client_ip = %ip, error = %limited, "request rate limited");
                return Err(HttpError::from(DaedalusError::from(limited)));
            }
            next.run(ctx).await
        })
    }
}
