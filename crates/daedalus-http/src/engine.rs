//! The hyper engine adapter.
//!
//! Converts `http::Request`s into [`Context`]s, runs the router and turns
//! the written response back into an `http::Response`. A request whose
//! future is dropped before completion (client disconnect, server abort)
//! has its propagation context cancelled.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use daedalus_core::{RequestContext, ShutdownSignal};
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;

use crate::carrier::ensure_context;
use crate::context::Context;
use crate::error::HttpError;
use crate::response::HttpResponse;
use crate::router::Router;

/// Per-connection engine settings.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EngineOptions {
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) max_body_size: Option<usize>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn collect_body<B>(body: B) -> Result<Bytes, BoxError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(Into::into)
}

async fn read_body<B>(body: B, limit: Option<usize>) -> Result<Bytes, HttpError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let collected = match limit {
        Some(limit) => collect_body(Limited::new(body, limit)).await,
        None => collect_body(body).await,
    };
    collected.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            HttpError::status(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {} bytes", limit.unwrap_or_default()),
            )
        } else {
            HttpError::decode(format!("failed to read request body: {e}"))
        }
    })
}

/// Cancels a request context unless disarmed.
struct CancelOnDrop(Option<RequestContext>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(ctx) = self.0.take() {
            tracing::debug!(trace_id = %ctx.trace_id(), "request abandoned, cancelling context");
            ctx.cancel();
        }
    }
}

impl Router {
    /// Handles one buffered request.
    ///
    /// `peer` is the remote socket address, used as the last fallback for
    /// [`Context::client_ip`].
    pub async fn handle(&self, mut request: Request<Bytes>, peer: Option<SocketAddr>) -> HttpResponse {
        let request_ctx = ensure_context(&mut request);
        let guard = CancelOnDrop(Some(request_ctx));

        let mut ctx = Context::new(request);
        ctx.set_peer_addr(peer);
        let response = self.dispatch(ctx).await;

        guard.disarm();
        response
    }

    async fn handle_incoming(
        &self,
        request: Request<Incoming>,
        peer: SocketAddr,
        options: EngineOptions,
    ) -> HttpResponse {
        let (parts, body) = request.into_parts();
        let body = match read_body(body, options.max_body_size).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(peer = %peer, error = %err, "failed to read request body");
                return error_response(Request::from_parts(parts, ()), &err);
            }
        };
        let mut request = Request::from_parts(parts, body);
        ensure_context(&mut request);

        match options.write_timeout {
            Some(limit) => {
                let mut head_only = Request::new(());
                *head_only.headers_mut() = request.headers().clone();
                *head_only.extensions_mut() = request.extensions().clone();
                match tokio::time::timeout(limit, self.handle(request, Some(peer))).await {
                    Ok(response) => response,
                    Err(_) => error_response(
                        head_only,
                        &HttpError::status(StatusCode::GATEWAY_TIMEOUT, "response not written in time"),
                    ),
                }
            }
            None => self.handle(request, Some(peer)).await,
        }
    }
}

fn error_response(request: Request<()>, err: &HttpError) -> HttpResponse {
    let mut ctx = Context::new(request.map(|()| Bytes::new()));
    ctx.write_error(err);
    ctx.into_response()
}

/// Serves one HTTP/1 connection until it closes or `shutdown` fires.
pub(crate) async fn serve_connection(
    router: Arc<Router>,
    stream: TcpStream,
    peer: SocketAddr,
    options: EngineOptions,
    shutdown: ShutdownSignal,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |request: Request<Incoming>| {
        let router = Arc::clone(&router);
        async move {
            Ok::<_, Infallible>(router.handle_incoming(request, peer, options).await)
        }
    });

    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new());
    if let Some(read_timeout) = options.read_timeout {
        builder.header_read_timeout(read_timeout);
    }

    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(peer = %peer, error = %e, "connection closed with error");
    }
}
