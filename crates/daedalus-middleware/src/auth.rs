//! JWT authentication.
//!
//! [`Authenticator`] holds the parsed [`AuthConfig`] and is shared by the
//! HTTP [`AuthMiddleware`] and the gRPC layer. A valid HS256 token must
//! carry a `user_id` claim (string or number); the resulting
//! [`AuthInfo`] is stored on the request's propagation context.

use std::fmt;
use std::sync::Arc;

use daedalus_core::{AuthInfo, DaedalusError};
use daedalus_http::{BoxFuture, Context, HandlerResult, HttpError, Middleware, Next};
use http::{HeaderMap, HeaderName, Method};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::config::AuthConfig;
use crate::error::{MiddlewareError, MiddlewareResult};

#[derive(Debug, Clone, PartialEq, Eq)]
struct WhitelistEntry {
    method: Option<Method>,
    path: String,
}

impl WhitelistEntry {
    fn parse(raw: &str) -> MiddlewareResult<Self> {
        let raw = raw.trim();
        match raw.split_once(char::is_whitespace) {
            Some((method, path)) => {
                let method = Method::from_bytes(method.as_bytes()).map_err(|_| {
                    MiddlewareError::invalid_config(format!("invalid whitelist method in `{raw}`"))
                })?;
                Ok(Self {
                    method: Some(method),
                    path: path.trim().to_string(),
                })
            }
            None => Ok(Self {
                method: None,
                path: raw.to_string(),
            }),
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        if self.method.as_ref().is_some_and(|m| m != method) {
            return false;
        }
        path == self.path || (self.path.ends_with('/') && path.starts_with(&self.path))
    }
}

struct AuthInner {
    header: HeaderName,
    prefixes: Vec<String>,
    whitelist: Vec<WhitelistEntry>,
    key: DecodingKey,
    validation: Validation,
}

/// Token extraction and validation.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<AuthInner>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("header", &self.inner.header)
            .field("prefixes", &self.inner.prefixes)
            .field("whitelist", &self.inner.whitelist)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Builds an authenticator from `config`.
    pub fn new(config: &AuthConfig) -> MiddlewareResult<Self> {
        config.validate()?;
        let header = HeaderName::from_bytes(config.header_key.as_bytes()).map_err(|e| {
            MiddlewareError::invalid_config(format!("invalid auth header `{}`: {e}", config.header_key))
        })?;
        let whitelist = config
            .whitelist
            .iter()
            .map(|entry| WhitelistEntry::parse(entry))
            .collect::<MiddlewareResult<Vec<_>>>()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();

        Ok(Self {
            inner: Arc::new(AuthInner {
                header,
                prefixes: config.token_prefixes.clone(),
                whitelist,
                key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
                validation,
            }),
        })
    }

    /// Returns true if `path` skips authentication.
    #[must_use]
    pub fn is_whitelisted(&self, method: &Method, path: &str) -> bool {
        self.inner.whitelist.iter().any(|entry| entry.matches(method, path))
    }

    /// Extracts the token from `headers`, stripping a configured prefix.
    #[must_use]
    pub fn extract_token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        let raw = headers.get(&self.inner.header)?.to_str().ok()?.trim();
        let token = self
            .inner
            .prefixes
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix.as_str()))
            .unwrap_or(raw)
            .trim();
        (!token.is_empty()).then_some(token)
    }

    /// Validates `token` and returns the caller.
    pub fn validate(&self, token: &str) -> Result<AuthInfo, DaedalusError> {
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.inner.key, &self.inner.validation)
            .map_err(|e| DaedalusError::unauthenticated(format!("invalid token: {e}")))?;
        AuthInfo::from_claims(data.claims)
            .ok_or_else(|| DaedalusError::unauthenticated("token has no user_id claim"))
    }

    /// Extracts and validates the token carried by `headers`.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, DaedalusError> {
        let token = self
            .extract_token(headers)
            .ok_or_else(|| DaedalusError::unauthenticated("missing token"))?;
        self.validate(token)
    }
}

/// HTTP authentication stage.
#[derive(Debug, Clone)]
pub struct AuthMiddleware {
    auth: Authenticator,
}

impl AuthMiddleware {
    /// Creates the stage from a shared authenticator.
    #[must_use]
    pub const fn new(auth: Authenticator) -> Self {
        Self { auth }
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if self.auth.is_whitelisted(ctx.method(), ctx.path()) {
                return next.run(ctx).await;
            }

            let info = self.auth.authenticate(ctx.headers()).map_err(HttpError::from)?;
            tracing::debug!(user_id = %info.user_id(), path = %ctx.path(), "request authenticated");

            let mut request_ctx = ctx.request_context();
            request_ctx.set_auth(info);
            ctx.set_request_context(request_ctx);
            next.run(ctx).await
        })
    }
}
