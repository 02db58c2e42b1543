//! # Daedalus HTTP
//!
//! The engine-agnostic HTTP surface of Daedalus.
//!
//! - [`Context`] - Request accessors, decoding and responders in one value
//! - [`Router`] / [`RouterGroup`] - Path routing with prefix groups and per-route middleware
//! - [`Handler`] / [`Middleware`] / [`Next`] - The handler chain
//! - [`HttpServer`] - The hyper-backed [`Server`](daedalus_core::Server) implementation
//! - [`context_from`] / [`inject_context`] - Propagation context carriers
//! - [`TestResponse`] - In-memory dispatch via [`Router::test`]
//!
//! ## Example
//!
//! ```rust
//! use daedalus_http::{handler_fn, Router};
//! use http::StatusCode;
//! use serde_json::json;
//!
//! let mut router = Router::new();
//! let mut api = router.group("/api/v1");
//! api.get(
//!     "/users/:id",
//!     handler_fn(|ctx| {
//!         Box::pin(async move {
//!             let id = ctx.param("id").unwrap_or_default().to_string();
//!             ctx.json(StatusCode::OK, &json!({ "id": id }))
//!         })
//!     }),
//! );
//! assert_eq!(router.len(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-http/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod carrier;
mod context;
mod engine;
mod error;
mod handler;
mod render;
mod response;
mod router;
mod server;
mod testing;

pub use carrier::{context_from, ensure_context, inject_context, Carrier, CarrierMut};
pub use context::{Context, UploadedFile, X_FORWARDED_FOR, X_REAL_IP};
pub use error::{HttpError, HttpResult};
pub use handler::{
    handler_fn, middleware_fn, BoxFuture, FnMiddleware, Handler, HandlerResult, Middleware, Next,
};
pub use render::Renderer;
pub use response::{HttpResponse, ResponseBody};
pub use router::{Router, RouterGroup};
pub use server::{HttpServer, HttpServerConfig, DEFAULT_GRACE_PERIOD_SECS, DEFAULT_MAX_BODY_SIZE};
pub use testing::TestResponse;
