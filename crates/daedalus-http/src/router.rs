//! Route registration and dispatch.
//!
//! [`Router`] maps method and path to a handler through the radix tree in
//! `daedalus-router`, and runs the router-wide middleware, then any group
//! middleware, then the handler. [`RouterGroup`] registers routes under a
//! shared prefix with its own middleware stack.

use std::sync::Arc;

use daedalus_router::{Lookup, Router as RouteTable};
use http::{Method, StatusCode};

use crate::context::Context;
use crate::error::HttpError;
use crate::handler::{BoxFuture, Handler, HandlerResult, Middleware, Next};
use crate::render::Renderer;
use crate::response::HttpResponse;

struct Route {
    handler: Arc<dyn Handler>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// The HTTP route table.
///
/// # Example
///
/// ```rust
/// use daedalus_http::{handler_fn, Router};
/// use http::StatusCode;
///
/// let mut router = Router::new();
/// router.get(
///     "/users/:id",
///     handler_fn(|ctx| {
///         Box::pin(async move {
///             let id = ctx.param("id").unwrap_or_default().to_string();
///             ctx.json(StatusCode::OK, &serde_json::json!({ "id": id }))
///         })
///     }),
/// );
///
/// let mut api = router.group("/api/v1");
/// api.post(
///     "/orders",
///     handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::CREATED, "ok") })),
/// );
/// assert_eq!(router.len(), 2);
/// ```
#[derive(Default)]
pub struct Router {
    routes: RouteTable<Arc<Route>>,
    middleware: Vec<Arc<dyn Middleware>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

macro_rules! method_routes {
    ($($(#[$doc:meta])* $name:ident => $method:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, path: &str, handler: impl Handler) -> &mut Self {
                self.route(Some(Method::$method), path, Arc::new(handler))
            }
        )*
    };
}

macro_rules! registration_methods {
    () => {
        method_routes! {
            /// Registers a `GET` route.
            get => GET;
            /// Registers a `POST` route.
            post => POST;
            /// Registers a `PUT` route.
            put => PUT;
            /// Registers a `DELETE` route.
            delete => DELETE;
            /// Registers a `PATCH` route.
            patch => PATCH;
            /// Registers an `OPTIONS` route.
            options => OPTIONS;
            /// Registers a `HEAD` route.
            head => HEAD;
        }

        /// Registers a route for every method.
        pub fn any(&mut self, path: &str, handler: impl Handler) -> &mut Self {
            self.route(None, path, Arc::new(handler))
        }

        /// Registers one handler for several methods.
        pub fn match_methods(
            &mut self,
            methods: &[Method],
            path: &str,
            handler: impl Handler,
        ) -> &mut Self {
            let handler: Arc<dyn Handler> = Arc::new(handler);
            for method in methods {
                self.route(Some(method.clone()), path, Arc::clone(&handler));
            }
            self
        }
    };
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    registration_methods!();

    fn route(&mut self, method: Option<Method>, path: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.insert(method, path, handler, Vec::new());
        self
    }

    fn insert(
        &mut self,
        method: Option<Method>,
        path: &str,
        handler: Arc<dyn Handler>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) {
        let route = Arc::new(Route {
            handler,
            middleware,
        });
        match method {
            Some(method) => {
                tracing::debug!(method = %method, path = %path, "route registered");
                self.routes.insert(method, path, route);
            }
            None => {
                tracing::debug!(method = "ANY", path = %path, "route registered");
                self.routes.insert_any(path, route);
            }
        }
    }

    /// Appends a middleware that runs for every request, including 404s.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Returns a group whose routes live under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_> {
        RouterGroup {
            router: self,
            prefix: join_path("", prefix),
            middleware: Vec::new(),
        }
    }

    /// Installs the template renderer used by [`Context::html`].
    pub fn set_renderer(&mut self, renderer: impl Renderer) -> &mut Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Returns the number of registered method and path pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true when no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the chain for a prepared context and builds the response.
    pub async fn dispatch(&self, mut ctx: Context) -> HttpResponse {
        ctx.set_renderer(self.renderer.clone());

        let lookup = self.routes.lookup(ctx.method(), ctx.path());
        let result = match lookup {
            Lookup::Found(found) => {
                let route = Arc::clone(found.value);
                ctx.set_route(found.pattern, found.params);
                let chain: Vec<Arc<dyn Middleware>> = self
                    .middleware
                    .iter()
                    .chain(route.middleware.iter())
                    .cloned()
                    .collect();
                Next::new(&chain, route.handler.as_ref()).run(&mut ctx).await
            }
            Lookup::MethodNotAllowed(allowed) => {
                let fallback = MethodNotAllowed(allowed);
                Next::new(&self.middleware, &fallback).run(&mut ctx).await
            }
            Lookup::NotFound => Next::new(&self.middleware, &NotFound).run(&mut ctx).await,
        };

        if let Err(err) = result {
            ctx.write_error(&err);
        }
        ctx.into_response()
    }
}

/// A set of routes sharing a prefix and a middleware stack.
pub struct RouterGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for RouterGroup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterGroup")
            .field("prefix", &self.prefix)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

impl RouterGroup<'_> {
    registration_methods!();

    fn route(&mut self, method: Option<Method>, path: &str, handler: Arc<dyn Handler>) -> &mut Self {
        let full = join_path(&self.prefix, path);
        self.router
            .insert(method, &full, handler, self.middleware.clone());
        self
    }

    /// Appends a middleware for routes registered on this group afterwards.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Returns a nested group; its stack starts with this group's stack.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_> {
        RouterGroup {
            prefix: join_path(&self.prefix, prefix),
            middleware: self.middleware.clone(),
            router: &mut *self.router,
        }
    }

    /// Returns the group prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

struct NotFound;

impl Handler for NotFound {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            Err(HttpError::status(
                StatusCode::NOT_FOUND,
                format!("no route for {}", ctx.path()),
            ))
        })
    }
}

struct MethodNotAllowed(Vec<Method>);

impl Handler for MethodNotAllowed {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let allow = self
                .0
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            ctx.set_header(http::header::ALLOW.as_str(), &allow)?;
            Err(HttpError::status(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("method {} not allowed for {}", ctx.method(), ctx.path()),
            ))
        })
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, middleware_fn};
    use bytes::Bytes;
    use http::Request;

    fn ok(body: &'static str) -> impl Handler {
        handler_fn(move |ctx| Box::pin(async move { ctx.text(StatusCode::OK, body) }))
    }

    async fn call(router: &Router, method: Method, path: &str) -> HttpResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap();
        router.dispatch(Context::new(request)).await
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", ""), "/");
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("/api", "/"), "/api");
        assert_eq!(join_path("api", "v1"), "api/v1");
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let mut router = Router::new();
        router.get("/users", ok("list"));

        let response = call(&router, Method::GET, "/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = call(&router, Method::DELETE, "/users").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[http::header::ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_any_and_match_methods() {
        let mut router = Router::new();
        router.any("/echo", ok("any"));
        router.match_methods(&[Method::PUT, Method::PATCH], "/items/:id", ok("update"));

        assert_eq!(call(&router, Method::TRACE, "/echo").await.status(), StatusCode::OK);
        assert_eq!(call(&router, Method::PATCH, "/items/3").await.status(), StatusCode::OK);
        assert_eq!(
            call(&router, Method::GET, "/items/3").await.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_group_middleware_is_scoped() {
        let mut router = Router::new();
        router.get("/public", ok("public"));
        {
            let mut admin = router.group("/admin");
            admin.use_middleware(middleware_fn("deny", |_ctx, _next| {
                Box::pin(async move { Err(HttpError::status(StatusCode::FORBIDDEN, "admins only")) })
            }));
            admin.get("/stats", ok("stats"));
        }

        assert_eq!(call(&router, Method::GET, "/public").await.status(), StatusCode::OK);
        assert_eq!(
            call(&router, Method::GET, "/admin/stats").await.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_nested_group_inherits_stack() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api");
            api.use_middleware(middleware_fn("tag", |ctx, next| {
                Box::pin(async move {
                    ctx.set("tag", "api");
                    next.run(ctx).await
                })
            }));
            let mut v1 = api.group("/v1");
            assert_eq!(v1.prefix(), "/api/v1");
            v1.get(
                "/whoami",
                handler_fn(|ctx| {
                    Box::pin(async move {
                        let tag = ctx.get::<&str>("tag").copied().unwrap_or("none");
                        ctx.text(StatusCode::OK, tag)
                    })
                }),
            );
        }

        let response = call(&router, Method::GET, "/api/v1/whoami").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"api");
    }
}
