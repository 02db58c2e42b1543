//! Radix tree router for Daedalus.
//!
//! Patterns use `:name` for a single-segment parameter and `*name` for a
//! trailing catch-all. A match reports the stored value, the registered
//! pattern (the "full path") and the captured parameters.
//!
//! # Example
//!
//! ```rust
//! use daedalus_router::Router;
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.insert(Method::GET, "/users", "list");
//! router.insert(Method::GET, "/users/:id", "show");
//! router.insert(Method::GET, "/files/*path", "serve");
//!
//! let found = router.match_route(&Method::GET, "/files/img/logo.png").unwrap();
//! assert_eq!(*found.value, "serve");
//! assert_eq!(found.pattern, "/files/*path");
//! assert_eq!(found.params.get("path"), Some("img/logo.png"));
//! ```
//!
//! # Architecture
//!
//! ```text
//!                    (root)
//!                      │
//!              ┌───────┴───────┐
//!              │               │
//!            "users"        "files"
//!              │               │
//!        ┌─────┴─────┐      "*path"
//!        │           │
//!     [GET]        ":id"
//!                    │
//!                  [GET]
//! ```

mod methods;
mod node;
mod params;
mod router;

pub use methods::MethodMap;
pub use node::{Endpoint, Node, SegmentKind};
pub use params::Params;
pub use router::{Lookup, Router};

/// A matched route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, T> {
    /// The value registered for the method and pattern
    pub value: &'a T,
    /// The registered pattern, e.g. `/users/:id`
    pub pattern: &'a str,
    /// Captured path parameters
    pub params: Params,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_multiple_params() {
        let mut router = Router::new();
        router.insert(Method::GET, "/orgs/:org/users/:user", "org_user");

        let found = router
            .match_route(&Method::GET, "/orgs/acme/users/123")
            .unwrap();
        assert_eq!(found.params.get("org"), Some("acme"));
        assert_eq!(found.params.get("user"), Some("123"));
        assert_eq!(found.pattern, "/orgs/:org/users/:user");
    }

    #[test]
    fn test_static_routes_do_not_capture() {
        let mut router = Router::new();
        router.insert(Method::GET, "/health", ());

        let found = router.match_route(&Method::GET, "/health").unwrap();
        assert!(found.params.is_empty());
    }
}
