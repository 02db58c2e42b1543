//! # Daedalus
//!
//! **A server toolkit: HTTP, gRPC middleware and queue consumers under one lifecycle**
//!
//! - **Unified HTTP surface**: engine-agnostic [`Context`], [`Router`] and middleware over hyper
//! - **Config-driven middleware**: auth, circuit breaker, rate limit, metrics, logging,
//!   recovery and timeout built from one `middlewares` block
//! - **Queue consumers**: a pull loop with a bounded worker pool and pluggable codecs
//! - **Supervision**: servers start in parallel and stop in order on SIGINT or SIGTERM
//! - **Live config**: TOML/JSON with `DAEDALUS__*` overrides, reloaded on change
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daedalus::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = Application::load("config.toml")?;
//!     app.init_logging()?;
//!
//!     let mut router = app.http_router()?;
//!     router.get(
//!         "/users/:id",
//!         handler_fn(|ctx| Box::pin(async move {
//!             let id = ctx.param("id").unwrap_or_default().to_string();
//!             ctx.json(http::StatusCode::OK, &serde_json::json!({ "id": id }))
//!         })),
//!     );
//!     app.add_server(Arc::new(app.http_server(router)?))?;
//!
//!     app.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! main ──► Application ──► ServerSet ──► HttpServer  (Router + middleware chain)
//!              │                    └──► QueueServer (Queue → Codec → WorkerPool → handler)
//!              ├── ConfigHolder ◄── ConfigWatcher (notify)
//!              └── StopRegistry ◄── SignalListener (SIGINT / SIGTERM)
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;

pub use app::Application;

pub use daedalus_breaker as breaker;
pub use daedalus_config as config;
pub use daedalus_core as core;
pub use daedalus_http as http;
pub use daedalus_limiter as limiter;
pub use daedalus_middleware as middleware;
pub use daedalus_queue as queue;
pub use daedalus_router as router;
pub use daedalus_supervisor as supervisor;
pub use daedalus_telemetry as telemetry;

pub use daedalus_config::{Config, WatchOptions};
pub use daedalus_core::{DaedalusError, DaedalusResult, RequestContext, Server};
pub use daedalus_http::{handler_fn, middleware_fn, Context, HttpServer, Router};

/// Prelude module for convenient imports.
///
/// ```rust
/// use daedalus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::Application;

    pub use daedalus_config::{Config, ConfigHolder, WatchOptions};
    pub use daedalus_core::{AuthInfo, DaedalusError, DaedalusResult, RequestContext, Server};
    pub use daedalus_http::{
        handler_fn, middleware_fn, Context, Handler, HttpServer, Middleware, Next, Router, RouterGroup,
    };
    pub use daedalus_middleware::{GrpcMiddlewareLayer, MiddlewareConfig};
    pub use daedalus_queue::{JsonCodec, MemoryQueue, ProstCodec, Queue, QueueHandler, QueueServer};
    pub use daedalus_supervisor::{ServerSet, StopRegistry};
}
