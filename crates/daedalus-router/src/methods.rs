//! Per-path method table.

use http::Method;

/// Maps HTTP methods to values for a single route pattern.
///
/// A value registered with [`MethodMap::set_any`] answers every method that
/// has no explicit entry.
///
/// # Example
///
/// ```rust
/// use daedalus_router::MethodMap;
/// use http::Method;
///
/// let mut map = MethodMap::new();
/// map.set(Method::GET, "list");
/// map.set(Method::POST, "create");
///
/// assert_eq!(map.get(&Method::GET), Some(&"list"));
/// assert_eq!(map.get(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodMap<T> {
    entries: Vec<(Method, T)>,
    any: Option<T>,
}

impl<T> Default for MethodMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            any: None,
        }
    }
}

impl<T> MethodMap<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` for `method`, returning the value it replaced.
    pub fn set(&mut self, method: Method, value: T) -> Option<T> {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == method) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((method, value));
        None
    }

    /// Registers `value` for every method without an explicit entry.
    pub fn set_any(&mut self, value: T) -> Option<T> {
        self.any.replace(value)
    }

    /// Returns the value registered for `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&T> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
            .or(self.any.as_ref())
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.any.is_none()
    }

    /// Returns the explicitly registered methods, in registration order.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        self.entries.iter().map(|(m, _)| m.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_existing_method() {
        let mut map = MethodMap::new();
        assert!(map.set(Method::GET, 1).is_none());
        assert_eq!(map.set(Method::GET, 2), Some(1));
        assert_eq!(map.get(&Method::GET), Some(&2));
    }

    #[test]
    fn test_any_is_fallback() {
        let mut map = MethodMap::new();
        map.set(Method::GET, "get");
        map.set_any("any");

        assert_eq!(map.get(&Method::GET), Some(&"get"));
        assert_eq!(map.get(&Method::PATCH), Some(&"any"));
        assert_eq!(map.get(&Method::from_bytes(b"PURGE").unwrap()), Some(&"any"));
    }

    #[test]
    fn test_allowed_methods() {
        let mut map = MethodMap::new();
        map.set(Method::GET, ());
        map.set(Method::DELETE, ());

        assert_eq!(map.allowed_methods(), vec![Method::GET, Method::DELETE]);
        assert!(!map.is_empty());
        assert!(MethodMap::<()>::new().is_empty());
    }
}
