//! Radix tree node implementation.
//!
//! Each node owns one path segment. Lookup prefers static children, then
//! the parameter child, then the catch-all child, and backtracks when a
//! deeper branch fails.

use crate::methods::MethodMap;
use crate::params::Params;

/// Type of path segment in the radix tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment (`users`)
    Static,
    /// Named parameter (`:id`)
    Param(String),
    /// Catch-all (`*path`), only valid as the last segment
    Wildcard(String),
}

/// A registered route pattern and its method table.
#[derive(Debug, Clone)]
pub struct Endpoint<T> {
    /// Normalized pattern, e.g. `/users/:id/posts`
    pub pattern: String,
    /// Values keyed by method
    pub methods: MethodMap<T>,
}

/// A node in the radix tree.
#[derive(Debug, Clone)]
pub struct Node<T> {
    segment: String,
    kind: SegmentKind,
    endpoint: Option<Endpoint<T>>,
    /// Sorted by segment for binary search
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: &str, kind: SegmentKind) -> Self {
        Self {
            segment: segment.to_string(),
            kind,
            endpoint: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root node.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Splits a pattern into typed segments. Empty segments are dropped.
    pub(crate) fn parse_pattern(pattern: &str) -> Vec<(&str, SegmentKind)> {
        pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    (s, SegmentKind::Param(name.to_string()))
                } else if let Some(name) = s.strip_prefix('*') {
                    (s, SegmentKind::Wildcard(name.to_string()))
                } else {
                    (s, SegmentKind::Static)
                }
            })
            .collect()
    }

    /// Returns the normalized form of `pattern`.
    #[must_use]
    pub fn normalize(pattern: &str) -> String {
        let joined = Self::parse_pattern(pattern)
            .iter()
            .map(|(s, _)| *s)
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }

    /// Returns the endpoint for `pattern`, creating nodes as needed.
    ///
    /// # Panics
    ///
    /// Panics when a catch-all is not the last segment, or when two patterns
    /// bind different parameter names at the same position.
    pub fn endpoint_mut(&mut self, pattern: &str) -> &mut Endpoint<T> {
        let segments = Self::parse_pattern(pattern);
        let normalized = Self::normalize(pattern);
        self.insert_segments(&segments, normalized)
    }

    fn insert_segments(
        &mut self,
        segments: &[(&str, SegmentKind)],
        pattern: String,
    ) -> &mut Endpoint<T> {
        let Some(((segment, kind), remaining)) = segments.split_first() else {
            return self.endpoint.get_or_insert_with(|| Endpoint {
                pattern,
                methods: MethodMap::new(),
            });
        };

        match kind {
            SegmentKind::Static => {
                let index = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(index) => index,
                    Err(index) => {
                        self.static_children
                            .insert(index, Node::new(segment, SegmentKind::Static));
                        index
                    }
                };
                self.static_children[index].insert_segments(remaining, pattern)
            }
            SegmentKind::Param(_) => {
                let child = self
                    .param_child
                    .get_or_insert_with(|| Box::new(Node::new(segment, kind.clone())));
                assert!(
                    child.kind == *kind,
                    "conflicting parameter names at `{}`: `{}` vs `{}`",
                    pattern,
                    child.segment,
                    segment
                );
                child.insert_segments(remaining, pattern)
            }
            SegmentKind::Wildcard(_) => {
                assert!(
                    remaining.is_empty(),
                    "catch-all must be the last segment in `{pattern}`"
                );
                let child = self
                    .wildcard_child
                    .get_or_insert_with(|| Box::new(Node::new(segment, kind.clone())));
                assert!(
                    child.kind == *kind,
                    "conflicting catch-all names at `{}`: `{}` vs `{}`",
                    pattern,
                    child.segment,
                    segment
                );
                child.insert_segments(&[], pattern)
            }
        }
    }

    /// Matches a concrete path against the tree.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&Endpoint<T>, Params)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        let endpoint = self.match_segments(&segments, &mut params)?;
        Some((endpoint, params))
    }

    fn match_segments<'a>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
    ) -> Option<&'a Endpoint<T>> {
        if let Some((segment, remaining)) = segments.split_first() {
            if let Some(child) = self.find_static_child(segment) {
                if let Some(found) = child.match_segments(remaining, params) {
                    return Some(found);
                }
            }

            if let Some(child) = &self.param_child {
                if let SegmentKind::Param(name) = &child.kind {
                    let mark = params.len();
                    params.push(name.as_str(), *segment);
                    if let Some(found) = child.match_segments(remaining, params) {
                        return Some(found);
                    }
                    params.truncate(mark);
                }
            }
        } else if let Some(endpoint) = &self.endpoint {
            return Some(endpoint);
        }

        let child = self.wildcard_child.as_ref()?;
        if let SegmentKind::Wildcard(name) = &child.kind {
            params.push(name.as_str(), segments.join("/"));
            return child.endpoint.as_ref();
        }
        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node<T>> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn insert(root: &mut Node<&'static str>, pattern: &str, value: &'static str) {
        root.endpoint_mut(pattern).methods.set(Method::GET, value);
    }

    fn lookup<'a>(root: &'a Node<&'static str>, path: &str) -> Option<(&'a str, Params)> {
        root.match_path(path)
            .and_then(|(ep, params)| ep.methods.get(&Method::GET).map(|v| (*v, params)))
    }

    #[test]
    fn test_parse_pattern() {
        let segments = Node::<()>::parse_pattern("/users/:id/*rest");
        assert_eq!(segments[0], ("users", SegmentKind::Static));
        assert_eq!(segments[1], (":id", SegmentKind::Param("id".into())));
        assert_eq!(segments[2], ("*rest", SegmentKind::Wildcard("rest".into())));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Node::<()>::normalize("users//:id/"), "/users/:id");
        assert_eq!(Node::<()>::normalize("/"), "/");
        assert_eq!(Node::<()>::normalize(""), "/");
    }

    #[test]
    fn test_static_priority_over_param() {
        let mut root = Node::root();
        insert(&mut root, "/users/me", "me");
        insert(&mut root, "/users/:id", "by_id");

        assert_eq!(lookup(&root, "/users/me").unwrap().0, "me");
        let (value, params) = lookup(&root, "/users/42").unwrap();
        assert_eq!(value, "by_id");
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn test_backtrack_drops_stale_param() {
        let mut root = Node::root();
        insert(&mut root, "/a/:x/b", "param_branch");
        insert(&mut root, "/a/*rest", "catch_all");

        let (value, params) = lookup(&root, "/a/1/c").unwrap();
        assert_eq!(value, "catch_all");
        assert_eq!(params.get("x"), None);
        assert_eq!(params.get("rest"), Some("1/c"));
    }

    #[test]
    fn test_backtrack_from_static_to_param() {
        let mut root = Node::root();
        insert(&mut root, "/files/new/edit", "static");
        insert(&mut root, "/files/:name", "param");

        let (value, params) = lookup(&root, "/files/new").unwrap();
        assert_eq!(value, "param");
        assert_eq!(params.get("name"), Some("new"));
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let mut root = Node::root();
        insert(&mut root, "/static/*filepath", "files");

        let (_, params) = lookup(&root, "/static/css/site.css").unwrap();
        assert_eq!(params.get("filepath"), Some("css/site.css"));

        let (_, params) = lookup(&root, "/static").unwrap();
        assert_eq!(params.get("filepath"), Some(""));
    }

    #[test]
    fn test_endpoint_keeps_pattern() {
        let mut root: Node<()> = Node::root();
        root.endpoint_mut("/users/:id/posts");

        let (endpoint, params) = root.match_path("/users/7/posts").unwrap();
        assert_eq!(endpoint.pattern, "/users/:id/posts");
        assert_eq!(params.get("id"), Some("7"));
    }

    #[test]
    fn test_no_match() {
        let mut root = Node::root();
        insert(&mut root, "/users", "list");
        assert!(lookup(&root, "/posts").is_none());
        assert!(lookup(&root, "/users/1").is_none());
    }

    #[test]
    #[should_panic(expected = "conflicting parameter names")]
    fn test_conflicting_param_names_panic() {
        let mut root: Node<()> = Node::root();
        root.endpoint_mut("/users/:id");
        root.endpoint_mut("/users/:uid/posts");
    }

    #[test]
    #[should_panic(expected = "catch-all must be the last segment")]
    fn test_wildcard_not_last_panics() {
        let mut root: Node<()> = Node::root();
        root.endpoint_mut("/files/*path/edit");
    }
}
