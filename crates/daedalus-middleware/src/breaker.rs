//! Circuit breaking per route pattern.

use std::sync::Arc;

use daedalus_breaker::BreakerManager;
use daedalus_core::DaedalusError;
use daedalus_http::{BoxFuture, Context, HandlerResult, HttpError, Middleware, Next};

/// HTTP breaker stage.
///
/// The breaker key is the matched route pattern. A handler error or a
/// response status of 500 or above counts as a failure; an open breaker
/// rejects the request with 503 before the handler runs. Requests that
/// matched no route pass through untracked.
#[derive(Debug, Clone)]
pub struct BreakerMiddleware {
    breakers: Arc<BreakerManager>,
}

impl BreakerMiddleware {
    /// Creates the stage over a shared breaker manager.
    #[must_use]
    pub const fn new(breakers: Arc<BreakerManager>) -> Self {
        Self { breakers }
    }

    /// Returns the breaker manager.
    #[must_use]
    pub fn breakers(&self) -> &Arc<BreakerManager> {
        &self.breakers
    }
}

impl Middleware for BreakerMiddleware {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if !ctx.matched() {
                return next.run(ctx).await;
            }
            let breaker = self.breakers.get(ctx.full_path());
            let outcome = breaker
                .call(
                    async {
                        let result = next.run(&mut *ctx).await;
                        let status = ctx.outcome_status(&result);
                        (result, status)
                    },
                    |(_, status)| !status.is_server_error(),
                )
                .await;

            match outcome {
                Ok((result, _)) => result,
                Err(rejected) => {
                    tracing::warn!(route = %breaker.name(), error = %rejected, "request rejected by circuit breaker");
                    Err(HttpError::from(DaedalusError::from(rejected)))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use daedalus_breaker::BreakerConfig;
    use daedalus_http::{handler_fn, Router};
    use http::{Request, StatusCode};

    #[tokio::test]
    async fn test_unmatched_paths_create_no_breakers() {
        let manager = Arc::new(BreakerManager::new(BreakerConfig::consecutive_failures(1)));
        let mut router = Router::new();
        router.use_middleware(BreakerMiddleware::new(Arc::clone(&manager)));
        router.get(
            "/users/:id",
            handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "ok") })),
        );

        for i in 0..200 {
            let request = Request::get(format!("/random-{i}")).body(Bytes::new()).unwrap();
            router.test(request, 0).await.assert_status(StatusCode::NOT_FOUND);
        }
        assert!(manager.is_empty());

        for i in 0..3 {
            let request = Request::get(format!("/users/{i}")).body(Bytes::new()).unwrap();
            router.test(request, 0).await.assert_status(StatusCode::OK);
        }
        assert_eq!(manager.len(), 1);
    }
}
