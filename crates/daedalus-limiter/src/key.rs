//! Bucket key composition.

use crate::config::RouteLimitConfig;

/// Separator between key parts.
pub const KEY_SEPARATOR: char = ':';

/// Identity of a request as seen by the limiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitSubject<'a> {
    /// Route pattern, e.g. `/users/:id`
    pub route: &'a str,
    /// Client IP address
    pub ip: &'a str,
    /// Authenticated user id; anonymous callers share the empty part
    pub user_id: Option<&'a str>,
}

impl<'a> LimitSubject<'a> {
    /// Creates a subject.
    #[must_use]
    pub fn new(route: &'a str, ip: &'a str, user_id: Option<&'a str>) -> Self {
        Self { route, ip, user_id }
    }
}

/// Joins the enabled parts of `subject` with `:`, in route, IP, user order.
///
/// With no part enabled every request shares one bucket under the empty key.
#[must_use]
pub fn build_key(config: &RouteLimitConfig, subject: &LimitSubject<'_>) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if config.enable_route {
        parts.push(subject.route);
    }
    if config.enable_ip {
        parts.push(subject.ip);
    }
    if config.enable_user_id {
        parts.push(subject.user_id.unwrap_or_default());
    }
    parts.join(&KEY_SEPARATOR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(route: bool, ip: bool, user: bool) -> RouteLimitConfig {
        RouteLimitConfig::default().with_key_parts(route, ip, user)
    }

    #[test]
    fn test_key_parts_in_order() {
        let subject = LimitSubject::new("/t", "1.1.1.1", Some("u1"));
        assert_eq!(build_key(&config(true, true, true), &subject), "/t:1.1.1.1:u1");
        assert_eq!(build_key(&config(true, false, true), &subject), "/t:u1");
        assert_eq!(build_key(&config(false, true, false), &subject), "1.1.1.1");
        assert_eq!(build_key(&config(false, false, false), &subject), "");
    }

    #[test]
    fn test_anonymous_user_part_is_empty() {
        let subject = LimitSubject::new("/t", "1.1.1.1", None);
        assert_eq!(build_key(&config(false, true, true), &subject), "1.1.1.1:");
    }
}
