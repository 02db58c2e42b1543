//! The middleware chain as a `tower` layer for gRPC services.
//!
//! [`GrpcMiddlewareLayer`] wraps any `http::Request` to `http::Response`
//! service, so it fits unary and streaming methods alike. Policy failures
//! are answered with a trailers-only response: HTTP 200, an empty body and
//! the `grpc-status` / `grpc-message` headers.
//!
//! | Failure | `grpc-status` |
//! |---------|---------------|
//! | missing or invalid token | 16 `UNAUTHENTICATED` |
//! | open breaker | 14 `UNAVAILABLE` |
//! | rate limited | 8 `RESOURCE_EXHAUSTED` |
//! | panic | 13 `INTERNAL` |
//! | deadline exceeded | 4 `DEADLINE_EXCEEDED` |

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use daedalus_core::{DaedalusError, RequestContext};
use daedalus_http::{ensure_context, inject_context, BoxFuture, X_FORWARDED_FOR, X_REAL_IP};
use daedalus_limiter::LimitSubject;
use futures_util::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Request, Response};
use tokio::time::Instant;
use tower::{Layer, Service};

use crate::config::MiddlewareConfig;
use crate::error::MiddlewareResult;
use crate::pipeline::Policies;
use crate::recovery::{install_panic_hook, panic_message, take_panic_stack};

/// `grpc-status` header name.
pub const GRPC_STATUS: &str = "grpc-status";

/// `grpc-message` header name.
pub const GRPC_MESSAGE: &str = "grpc-message";

/// gRPC codes that count as a breaker failure.
const SERVER_FAILURE_CODES: &[u8] = &[2, 4, 13, 14, 15];

/// Applies the configured middleware to a gRPC service.
///
/// # Example
///
/// ```rust
/// use daedalus_middleware::{GrpcMiddlewareLayer, MiddlewareConfig};
/// use tower::Layer;
///
/// let layer = GrpcMiddlewareLayer::new(&MiddlewareConfig::default()).unwrap();
/// let _service = layer.layer(tower::service_fn(|_req: http::Request<()>| async {
///     Ok::<_, std::convert::Infallible>(http::Response::new(String::new()))
/// }));
/// ```
#[derive(Debug, Clone)]
pub struct GrpcMiddlewareLayer {
    policies: Arc<Policies>,
}

impl GrpcMiddlewareLayer {
    /// Builds the layer from `config`.
    pub fn new(config: &MiddlewareConfig) -> MiddlewareResult<Self> {
        Ok(Self {
            policies: Arc::new(Policies::from_config(config)?),
        })
    }
}

impl<S> Layer<S> for GrpcMiddlewareLayer {
    type Service = GrpcMiddlewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcMiddlewareService {
            inner,
            policies: Arc::clone(&self.policies),
        }
    }
}

/// The service produced by [`GrpcMiddlewareLayer`].
#[derive(Debug, Clone)]
pub struct GrpcMiddlewareService<S> {
    inner: S,
    policies: Arc<Policies>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcMiddlewareService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The ready instance goes into the future; a fresh clone stays behind.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(dispatch(Arc::clone(&self.policies), inner, request))
    }
}

/// Builds a trailers-only response for `err`.
pub fn trailers_only<B: Default>(err: &DaedalusError) -> Response<B> {
    let mut response = Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert(GRPC_STATUS, HeaderValue::from(u16::from(err.grpc_code().as_u8())));
    if let Ok(message) = HeaderValue::from_str(&percent_encode(err.message())) {
        headers.insert(GRPC_MESSAGE, message);
    }
    response
}

/// Percent-encodes a `grpc-message` value.
fn percent_encode(message: &str) -> String {
    let mut encoded = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Returns the `grpc-status` carried in response headers, `0` when absent.
fn status_code<B>(response: &Response<B>) -> u8 {
    response
        .headers()
        .get(GRPC_STATUS)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header(X_FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .or_else(|| header(X_REAL_IP))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

async fn dispatch<S, ReqBody, ResBody>(
    policies: Arc<Policies>,
    inner: S,
    mut request: Request<ReqBody>,
) -> Result<Response<ResBody>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    let method = request.uri().path().to_string();
    let mut request_ctx = ensure_context(&mut request);

    if let Some(auth) = &policies.auth {
        if !auth.is_whitelisted(request.method(), &method) {
            match auth.authenticate(request.headers()) {
                Ok(info) => {
                    request_ctx.set_auth(info);
                    inject_context(request_ctx.clone(), &mut request);
                }
                Err(err) => {
                    tracing::info!(method = %method, error = %err, "grpc call unauthenticated");
                    return Ok(trailers_only(&err));
                }
            }
        }
    }

    let Some(breakers) = &policies.breakers else {
        return limited(&policies, inner, request, request_ctx, &method).await;
    };

    let breaker = breakers.get(&method);
    let outcome = breaker
        .call(
            limited(&policies, inner, request, request_ctx, &method),
            |result| match result {
                Ok(response) => !SERVER_FAILURE_CODES.contains(&status_code(response)),
                Err(_) => false,
            },
        )
        .await;

    match outcome {
        Ok(result) => result,
        Err(rejected) => {
            tracing::warn!(method = %method, error = %rejected, "grpc call rejected by circuit breaker");
            Ok(trailers_only(&DaedalusError::from(rejected)))
        }
    }
}

async fn limited<S, ReqBody, ResBody>(
    policies: &Policies,
    inner: S,
    request: Request<ReqBody>,
    request_ctx: RequestContext,
    method: &str,
) -> Result<Response<ResBody>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    let ip = client_ip(request.headers());

    if let Some(limiters) = &policies.limiters {
        let subject = LimitSubject::new(method, &ip, request_ctx.user_id());
        if let Err(limited) = limiters.check(&subject, &request_ctx).await {
            tracing::info!(method = %method, client_ip = %ip, error = %limited, "grpc call rate limited");
            return Ok(trailers_only(&DaedalusError::from(limited)));
        }
    }

    let started = Instant::now();
    let result = guarded(policies, inner, request, &request_ctx, method).await;

    let code = match &result {
        Ok(response) => status_code(response),
        Err(_) => 13,
    };
    if policies.metrics {
        daedalus_telemetry::record_grpc_request(method, code, started.elapsed());
    }
    if policies.logging {
        tracing::info!(
            method = %method,
            code,
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            trace_id = %request_ctx.trace_id(),
            client_ip = %ip,
            "grpc call completed"
        );
    }
    result
}

async fn guarded<S, ReqBody, ResBody>(
    policies: &Policies,
    mut inner: S,
    mut request: Request<ReqBody>,
    request_ctx: &RequestContext,
    method: &str,
) -> Result<Response<ResBody>, S::Error>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Default,
{
    let deadline = policies.timeout.map(|timeout| {
        let mut bounded = request_ctx.clone();
        bounded.set_deadline(Instant::now() + timeout);
        inject_context(bounded.clone(), &mut request);
        bounded
    });

    let call = inner.call(request);
    let timed = async {
        match &deadline {
            Some(bounded) => {
                let at = bounded.deadline().unwrap_or_else(Instant::now);
                match tokio::time::timeout_at(at, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        bounded.cancel();
                        tracing::warn!(method = %method, trace_id = %bounded.trace_id(), "grpc deadline exceeded");
                        Ok(trailers_only(&DaedalusError::timeout("request deadline exceeded")))
                    }
                }
            }
            None => call.await,
        }
    };

    if !policies.recovery {
        return timed.await;
    }
    recover(timed, method).await
}

async fn recover<F, T, E>(fut: F, method: &str) -> Result<Response<T>, E>
where
    F: Future<Output = Result<Response<T>, E>>,
    T: Default,
{
    install_panic_hook();
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let stack = take_panic_stack();
            tracing::error!(method = %method, panic = %message, stack = %stack, "grpc handler panicked");
            Ok(trailers_only(&DaedalusError::panic(message)))
        }
    }
}
