//! Handler and middleware traits.
//!
//! Handlers and middleware both borrow the [`Context`] mutably for the
//! duration of their future. A middleware receives a [`Next`] and may call
//! [`Next::run`] once to continue the chain, or return without calling it
//! to short-circuit.
//!
//! # Example
//!
//! ```rust
//! use daedalus_http::{handler_fn, middleware_fn, Context, Router};
//! use http::StatusCode;
//!
//! let mut router = Router::new();
//! router.use_middleware(middleware_fn("stamp", |ctx, next| {
//!     Box::pin(async move {
//!         ctx.set("stamped", true);
//!         next.run(ctx).await
//!     })
//! }));
//! router.get(
//!     "/ping",
//!     handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })),
//! );
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HttpError;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What handlers and middleware return.
pub type HandlerResult = Result<(), HttpError>;

/// A request handler.
pub trait Handler: Send + Sync + 'static {
    /// Handles the request, writing the response through `ctx`.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        self(ctx)
    }
}

/// Pins down the higher-ranked signature of a handler closure.
///
/// Closures passed straight to a generic `H: Handler` parameter cannot
/// infer a return type that borrows from the argument; this helper supplies
/// the signature.
pub fn handler_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    f
}

/// A middleware stage.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the stage name used in logs.
    fn name(&self) -> &'static str {
        "middleware"
    }

    /// Processes the request, optionally calling `next.run(ctx)`.
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Next<'a> {
    /// Creates a chain that runs `chain` in order, then `handler`.
    #[must_use]
    pub fn new(chain: &'a [Arc<dyn Middleware>], handler: &'a dyn Handler) -> Self {
        Self { chain, handler }
    }

    /// Runs the next middleware, or the handler at the end of the chain.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((first, rest)) => first.handle(
                ctx,
                Next {
                    chain: rest,
                    handler: self.handler,
                },
            ),
            None => self.handler.call(ctx),
        }
    }
}

/// A middleware built from a closure.
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        (self.func)(ctx, next)
    }
}

/// Builds a middleware from a closure.
pub fn middleware_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware { name, func }
}
