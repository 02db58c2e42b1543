//! Authenticated caller information.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim key that carries the user identifier inside a token.
pub(crate) const USER_ID_CLAIM: &str = "user_id";

/// The authenticated caller of a request.
///
/// Set on the [`RequestContext`](crate::RequestContext) by the auth
/// middleware once a token has been validated.
///
/// # Example
///
/// ```
/// use daedalus_core::AuthInfo;
/// use serde_json::json;
///
/// let claims = json!({"user_id": "42", "role": "admin"});
/// let info = AuthInfo::from_claims(claims.as_object().unwrap().clone()).unwrap();
/// assert_eq!(info.user_id(), "42");
/// assert_eq!(info.claim("role"), Some(&json!("admin")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    user_id: String,
    claims: Map<String, Value>,
}

impl AuthInfo {
    /// Creates auth info from a user id and claim set.
    #[must_use]
    pub fn new(user_id: impl Into<String>, claims: Map<String, Value>) -> Self {
        Self {
            user_id: user_id.into(),
            claims,
        }
    }

    /// Builds auth info from decoded token claims.
    ///
    /// Returns `None` when the `user_id` claim is missing or is neither a
    /// string nor a number.
    #[must_use]
    pub fn from_claims(claims: Map<String, Value>) -> Option<Self> {
        let user_id = match claims.get(USER_ID_CLAIM)? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self { user_id, claims })
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns all claims carried by the token.
    #[must_use]
    pub const fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Returns a single claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_from_claims_string_user_id() {
        let info = AuthInfo::from_claims(claims(json!({"user_id": "u-1"}))).unwrap();
        assert_eq!(info.user_id(), "u-1");
    }

    #[test]
    fn test_from_claims_numeric_user_id() {
        let info = AuthInfo::from_claims(claims(json!({"user_id": 7}))).unwrap();
        assert_eq!(info.user_id(), "7");
    }

    #[test]
    fn test_from_claims_missing_user_id() {
        assert!(AuthInfo::from_claims(claims(json!({"sub": "x"}))).is_none());
        assert!(AuthInfo::from_claims(claims(json!({"user_id": ""}))).is_none());
        assert!(AuthInfo::from_claims(claims(json!({"user_id": true}))).is_none());
    }

    #[test]
    fn test_claim_lookup() {
        let info = AuthInfo::new("u", claims(json!({"scope": "read"})));
        assert_eq!(info.claim("scope"), Some(&json!("read")));
        assert!(info.claim("missing").is_none());
    }
}
