//! High-level router API.

use http::Method;

use crate::node::{Endpoint, Node};
use crate::params::Params;
use crate::RouteMatch;

/// Outcome of a lookup that considers the method.
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// A route matched path and method.
    Found(RouteMatch<'a, T>),
    /// The path matched but the method did not; carries the allowed methods.
    MethodNotAllowed(Vec<Method>),
    /// Nothing matched the path.
    NotFound,
}

/// A radix tree router generic over the stored value.
///
/// # Route Priority
///
/// 1. **Static segments** (`/users/me`)
/// 2. **Parameter segments** (`/users/:id`)
/// 3. **Catch-all segments** (`/files/*path`)
///
/// # Example
///
/// ```rust
/// use daedalus_router::Router;
/// use http::Method;
///
/// let mut router = Router::new();
/// router.insert(Method::GET, "/users/:id/posts", "list_posts");
///
/// let found = router.match_route(&Method::GET, "/users/42/posts").unwrap();
/// assert_eq!(*found.value, "list_posts");
/// assert_eq!(found.pattern, "/users/:id/posts");
/// assert_eq!(found.params.get("id"), Some("42"));
/// ```
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `value` for `method` on `pattern`.
    ///
    /// Re-registering the same method and pattern replaces the earlier value.
    ///
    /// # Panics
    ///
    /// Panics on malformed patterns; see [`Node::endpoint_mut`].
    pub fn insert(&mut self, method: Method, pattern: &str, value: T) {
        if self.endpoint(pattern).methods.set(method, value).is_none() {
            self.route_count += 1;
        }
    }

    /// Registers `value` for every method on `pattern`.
    pub fn insert_any(&mut self, pattern: &str, value: T) {
        if self.endpoint(pattern).methods.set_any(value).is_none() {
            self.route_count += 1;
        }
    }

    fn endpoint(&mut self, pattern: &str) -> &mut Endpoint<T> {
        self.root.endpoint_mut(pattern)
    }

    /// Matches a method and concrete path.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, T>> {
        match self.lookup(method, path) {
            Lookup::Found(found) => Some(found),
            Lookup::MethodNotAllowed(_) | Lookup::NotFound => None,
        }
    }

    /// Matches a method and path, distinguishing 404 from 405.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, T> {
        let Some((endpoint, params)) = self.root.match_path(path) else {
            return Lookup::NotFound;
        };
        match endpoint.methods.get(method) {
            Some(value) => Lookup::Found(RouteMatch {
                value,
                pattern: &endpoint.pattern,
                params,
            }),
            None => Lookup::MethodNotAllowed(endpoint.methods.allowed_methods()),
        }
    }

    /// Matches a path without considering the method.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&str, Params)> {
        self.root
            .match_path(path)
            .map(|(endpoint, params)| (endpoint.pattern.as_str(), params))
    }

    /// Returns the number of registered method and pattern pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
