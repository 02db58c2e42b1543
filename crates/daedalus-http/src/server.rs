//! The HTTP server.
//!
//! [`HttpServer`] binds a TCP listener, accepts connections and serves each
//! one on its own task through the hyper engine adapter. It implements
//! [`daedalus_core::Server`] so the supervisor can run it alongside queue
//! and gRPC servers.
//!
//! # Example
//!
//! ```rust,no_run
//! use daedalus_core::Server;
//! use daedalus_http::{handler_fn, HttpServer, HttpServerConfig, Router};
//! use http::StatusCode;
//!
//! # async fn run() -> daedalus_core::DaedalusResult<()> {
//! let mut router = Router::new();
//! router.get("/ping", handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })));
//!
//! let server = HttpServer::new("api", HttpServerConfig::default(), router);
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daedalus_core::{DaedalusError, DaedalusResult, Server, ShutdownSignal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::engine::{serve_connection, EngineOptions};
use crate::router::Router;

/// Default grace period for in-flight connections on shutdown.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;

/// Default cap on a buffered request body (50 MiB, enough for uploads).
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Listener and timeout settings for an [`HttpServer`].
///
/// Timeouts are whole seconds; `0` disables them, as it does the body cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpServerConfig {
    /// Listen address, e.g. `0.0.0.0:8080`. A bare `:8080` listens on all
    /// interfaces.
    pub addr: String,
    /// Time allowed to read request headers.
    pub read_timeout: u64,
    /// Time allowed to produce the response.
    pub write_timeout: u64,
    /// Time in-flight connections get to finish after `stop`.
    pub grace_period: u64,
    /// Largest request body in bytes; larger bodies get 413.
    pub max_body_size: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            read_timeout: 0,
            write_timeout: 0,
            grace_period: DEFAULT_GRACE_PERIOD_SECS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl HttpServerConfig {
    /// Creates a config listening on `addr` with default timeouts.
    #[must_use]
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    /// Returns the address handed to the listener.
    ///
    /// ```
    /// use daedalus_http::HttpServerConfig;
    ///
    /// assert_eq!(HttpServerConfig::with_addr(":8080").bind_addr(), "0.0.0.0:8080");
    /// assert_eq!(HttpServerConfig::with_addr("127.0.0.1:0").bind_addr(), "127.0.0.1:0");
    /// ```
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            read_timeout: secs(self.read_timeout),
            write_timeout: secs(self.write_timeout),
            max_body_size: (self.max_body_size > 0).then_some(self.max_body_size),
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Constructed,
    Started,
    Stopped,
}

/// An HTTP/1 server over a [`Router`].
pub struct HttpServer {
    name: String,
    config: HttpServerConfig,
    router: Arc<Router>,
    state: Mutex<State>,
    shutdown: ShutdownSignal,
    bound_addr: Mutex<Option<SocketAddr>>,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl HttpServer {
    /// Creates a server that will serve `router` once started.
    pub fn new(name: impl Into<String>, config: HttpServerConfig, router: Router) -> Self {
        Self {
            name: name.into(),
            config,
            router: Arc::new(router),
            state: Mutex::new(State::Constructed),
            shutdown: ShutdownSignal::new(),
            bound_addr: Mutex::new(None),
        }
    }

    /// Returns the bound address once the listener is up.
    ///
    /// Useful when the configured port is `0`.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// Returns the router being served.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Waits until the listener is bound. Returns `None` once the server
    /// has stopped or failed to bind.
    pub async fn ready(&self) -> Option<SocketAddr> {
        loop {
            if let Some(addr) = self.local_addr() {
                return Some(addr);
            }
            if self.shutdown.is_shutdown() {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn bind(&self) -> DaedalusResult<TcpListener> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DaedalusError::transport(format!("failed to bind {bind_addr}"), e)
        })?;
        let addr = listener.local_addr().map_err(|e| {
            DaedalusError::transport(format!("failed to read local address of {}", self.config.addr), e)
        })?;
        *self.bound_addr.lock() = Some(addr);
        tracing::info!(server = %self.name, addr = %addr, "http server listening");
        Ok(listener)
    }

    async fn run(&self, listener: TcpListener) {
        let options = self.config.engine_options();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::trace!(server = %self.name, peer = %peer, "accepted connection");
                            connections.spawn(serve_connection(
                                Arc::clone(&self.router),
                                stream,
                                peer,
                                options,
                                self.shutdown.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!(server = %self.name, error = %e, "failed to accept connection");
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = self.shutdown.recv() => break,
            }
        }

        drop(listener);
        let in_flight = connections.len();
        if in_flight == 0 {
            return;
        }
        tracing::info!(server = %self.name, connections = in_flight, "draining connections");

        let grace = Duration::from_secs(self.config.grace_period);
        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                server = %self.name,
                remaining = connections.len(),
                "grace period elapsed, dropping connections"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
    }
}

#[async_trait]
impl Server for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> DaedalusResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                State::Constructed => *state = State::Started,
                State::Started => {
                    return Err(DaedalusError::fatal(format!(
                        "http server {} already started",
                        self.name
                    )));
                }
                State::Stopped => return Ok(()),
            }
        }

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(err) => {
                self.shutdown.trigger();
                return Err(err);
            }
        };
        self.run(listener).await;
        tracing::info!(server = %self.name, "http server stopped");
        Ok(())
    }

    async fn stop(&self) -> DaedalusResult<()> {
        *self.state.lock() = State::Stopped;
        if self.shutdown.trigger() {
            tracing::info!(server = %self.name, "http server stopping");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn ping_router() -> Router {
        let mut router = Router::new();
        router.get(
            "/ping",
            handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })),
        );
        router
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_config_defaults() {
        let config = HttpServerConfig::default();
        assert_eq!(config.grace_period, 30);
        assert!(config.engine_options().read_timeout.is_none());
        assert_eq!(config.engine_options().max_body_size, Some(DEFAULT_MAX_BODY_SIZE));

        let config: HttpServerConfig =
            serde_json::from_str(r#"{"addr":"127.0.0.1:9000","readTimeout":5}"#).unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.engine_options().read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.grace_period, 30);

        let config: HttpServerConfig = serde_json::from_str(r#"{"maxBodySize":0}"#).unwrap();
        assert!(config.engine_options().max_body_size.is_none());
    }

    #[tokio::test]
    async fn test_serves_requests_and_stops() {
        let server = Arc::new(HttpServer::new(
            "test",
            HttpServerConfig::with_addr("127.0.0.1:0"),
            ping_router(),
        ));
        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });

        let addr = server.ready().await.unwrap();
        let ok = raw_get(addr, "/ping").await;
        assert!(ok.starts_with("HTTP/1.1 200"));
        assert!(ok.ends_with("pong"));

        let missing = raw_get(addr, "/nope").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
        assert!(missing.contains("NOT_FOUND"));

        server.stop().await.unwrap();
        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut router = ping_router();
        router.post(
            "/echo",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let body = ctx.body().clone();
                    ctx.data(StatusCode::OK, "text/plain", body)
                })
            }),
        );
        let config = HttpServerConfig {
            max_body_size: 8,
            ..HttpServerConfig::with_addr("127.0.0.1:0")
        };
        let server = Arc::new(HttpServer::new("capped", config, router));
        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });
        let addr = server.ready().await.unwrap();

        let post = move |body: &'static str| async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let request = format!(
                "POST /echo HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).await.unwrap();
            response
        };

        let small = post("tiny").await;
        assert!(small.starts_with("HTTP/1.1 200"), "{small}");
        assert!(small.ends_with("tiny"), "{small}");

        let large = post("far too large a body").await;
        assert!(large.starts_with("HTTP/1.1 413"), "{large}");
        assert!(large.contains("PAYLOAD_TOO_LARGE"), "{large}");

        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let server = HttpServer::new("early", HttpServerConfig::with_addr("127.0.0.1:0"), ping_router());
        server.stop().await.unwrap();
        server.start().await.unwrap();
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_bind_error_is_transport() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let server = HttpServer::new("clash", HttpServerConfig::with_addr(addr.to_string()), ping_router());
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, DaedalusError::Transport { .. }));

        let ready = tokio::time::timeout(Duration::from_secs(1), server.ready())
            .await
            .unwrap();
        assert!(ready.is_none());
    }
}
