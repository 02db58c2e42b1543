//! The universal per-request context.
//!
//! A [`Context`] is built by the engine adapter for every request. Handlers
//! and middleware read request metadata from it and write exactly one
//! response body through its responders (see `response.rs`).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use daedalus_core::RequestContext;
use daedalus_router::Params;
use http::header::{self, HeaderMap};
use http::{Extensions, Method, Request, Uri, Version};
use serde::de::DeserializeOwned;

use crate::error::{HttpError, HttpResult};
use crate::render::Renderer;
use crate::response::ResponseState;

/// Header consulted first for the client address.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Header consulted second for the client address.
pub const X_REAL_IP: &str = "x-real-ip";

/// Per-request state shared by middleware and the handler.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use daedalus_http::Context;
///
/// let request = http::Request::get("/users?page=2")
///     .header("x-forwarded-for", "10.0.0.1, 172.16.0.1")
///     .body(Bytes::new())
///     .unwrap();
/// let ctx = Context::new(request);
///
/// assert_eq!(ctx.path(), "/users");
/// assert_eq!(ctx.query_value("page").as_deref(), Some("2"));
/// assert_eq!(ctx.client_ip().as_deref(), Some("10.0.0.1"));
/// ```
pub struct Context {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
    params: Params,
    route_pattern: Option<String>,
    peer_addr: Option<SocketAddr>,
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
    request_context: Option<RequestContext>,
    renderer: Option<Arc<dyn Renderer>>,
    pub(crate) response: ResponseState,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("route_pattern", &self.route_pattern)
            .field("status", &self.response.status)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Builds a context from a request with a buffered body.
    #[must_use]
    pub fn new(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            extensions: parts.extensions,
            body,
            params: Params::new(),
            route_pattern: None,
            peer_addr: None,
            values: HashMap::new(),
            request_context: None,
            renderer: None,
            response: ResponseState::default(),
        }
    }

    pub(crate) fn set_peer_addr(&mut self, addr: Option<SocketAddr>) {
        self.peer_addr = addr;
    }

    pub(crate) fn set_route(&mut self, pattern: &str, params: Params) {
        self.route_pattern = Some(pattern.to_string());
        self.params = params;
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<Arc<dyn Renderer>>) {
        self.renderer = renderer;
    }

    pub(crate) fn renderer(&self) -> Option<&Arc<dyn Renderer>> {
        self.renderer.as_ref()
    }

    // ------------------------------------------------------------------
    // Request metadata
    // ------------------------------------------------------------------

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the HTTP version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the concrete request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the matched route pattern (`/users/:id`), or the concrete
    /// path when no route matched.
    #[must_use]
    pub fn full_path(&self) -> &str {
        self.route_pattern.as_deref().unwrap_or_else(|| self.uri.path())
    }

    /// Returns true once a route matched.
    #[must_use]
    pub const fn matched(&self) -> bool {
        self.route_pattern.is_some()
    }

    /// Returns a path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Returns all path parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the engine-native request extensions.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns the engine-native request extensions mutably.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Returns the raw body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the client IP from `X-Forwarded-For`, then `X-Real-IP`,
    /// then the peer address.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header(X_FORWARDED_FOR) {
            if let Some(first) = forwarded.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return Some(first.to_string());
                }
            }
        }
        if let Some(real_ip) = self.header(X_REAL_IP).map(str::trim) {
            if !real_ip.is_empty() {
                return Some(real_ip.to_string());
            }
        }
        self.peer_addr.map(|addr| addr.ip().to_string())
    }

    // ------------------------------------------------------------------
    // Query, form and body decoding
    // ------------------------------------------------------------------

    /// Returns the raw query string.
    #[must_use]
    pub fn query_string(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    /// Deserializes the query string.
    pub fn query<T: DeserializeOwned>(&self) -> HttpResult<T> {
        serde_urlencoded::from_str(self.query_string())
            .map_err(|e| HttpError::decode(format!("invalid query string: {e}")))
    }

    /// Returns the first value of a query parameter.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<String> {
        first_pair(self.query_string().as_bytes(), name)
    }

    /// Deserializes a JSON body.
    ///
    /// Returns [`HttpError::Decode`] when the body is empty or malformed.
    pub fn bind_json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        if self.body.is_empty() {
            return Err(HttpError::decode("request body is empty"));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpError::decode(format!("invalid JSON body: {e}")))
    }

    /// Deserializes an `application/x-www-form-urlencoded` body.
    pub fn form<T: DeserializeOwned>(&self) -> HttpResult<T> {
        serde_urlencoded::from_bytes(&self.body)
            .map_err(|e| HttpError::decode(format!("invalid form body: {e}")))
    }

    /// Returns the first value of a urlencoded form field.
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<String> {
        first_pair(&self.body, name)
    }

    /// Reads the multipart file part named `name`.
    ///
    /// Returns [`HttpError::NotFound`] when no such part exists and
    /// [`HttpError::Decode`] when the body is not valid multipart.
    pub async fn form_file(&self, name: &str) -> HttpResult<UploadedFile> {
        let content_type = self
            .header(header::CONTENT_TYPE.as_str())
            .ok_or_else(|| HttpError::decode("missing Content-Type for multipart body"))?;
        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| HttpError::decode(format!("invalid multipart boundary: {e}")))?;

        let body = self.body.clone();
        let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| HttpError::decode(format!("multipart parse error: {e}")))?
        {
            if field.name() != Some(name) {
                continue;
            }
            let file_name = field.file_name().map(ToString::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| HttpError::decode(format!("multipart field error: {e}")))?;
            return Ok(UploadedFile {
                name: name.to_string(),
                file_name,
                content_type,
                data,
            });
        }

        Err(HttpError::not_found(format!("form file '{name}'")))
    }

    // ------------------------------------------------------------------
    // Cookies
    // ------------------------------------------------------------------

    /// Returns the value of a request cookie.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies()
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    /// Returns every request cookie in header order.
    #[must_use]
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.trim().to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Key/value bag
    // ------------------------------------------------------------------

    /// Stores a value under `key` for later middleware or the handler.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it has type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns true if `key` is set.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Propagation context
    // ------------------------------------------------------------------

    /// Returns the propagation context: the override slot, then the one in
    /// the request extensions, else a fresh one.
    #[must_use]
    pub fn request_context(&self) -> RequestContext {
        crate::carrier::context_from(self)
    }

    /// Replaces the propagation context for the rest of the chain.
    pub fn set_request_context(&mut self, ctx: RequestContext) {
        self.request_context = Some(ctx);
    }

    pub(crate) const fn request_context_override(&self) -> Option<&RequestContext> {
        self.request_context.as_ref()
    }
}

/// A file part read from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Form field name.
    pub name: String,
    /// Client-supplied file name.
    pub file_name: Option<String>,
    /// Declared MIME type.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Returns the size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for an empty upload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn first_pair(encoded: &[u8], name: &str) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(encoded)
        .ok()?
        .into_iter()
        .find_map(|(k, v)| (k == name).then_some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn request(uri: &str) -> http::request::Builder {
        Request::builder().uri(uri)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Page {
        page: u32,
        size: Option<u32>,
    }

    #[test]
    fn test_full_path_falls_back_to_path() {
        let mut ctx = Context::new(request("/users/42").body(Bytes::new()).unwrap());
        assert_eq!(ctx.full_path(), "/users/42");
        assert!(!ctx.matched());

        ctx.set_route(
            "/users/:id",
            [("id".to_string(), "42".to_string())].into_iter().collect(),
        );
        assert_eq!(ctx.full_path(), "/users/:id");
        assert_eq!(ctx.param("id"), Some("42"));
    }

    #[test]
    fn test_query_decoding() {
        let ctx = Context::new(request("/items?page=3").body(Bytes::new()).unwrap());
        let page: Page = ctx.query().unwrap();
        assert_eq!(page, Page { page: 3, size: None });

        let bad = Context::new(request("/items?page=abc").body(Bytes::new()).unwrap());
        assert!(matches!(bad.query::<Page>(), Err(HttpError::Decode(_))));
    }

    #[test]
    fn test_bind_json_empty_and_malformed() {
        #[derive(Deserialize)]
        struct Body {
            #[allow(dead_code)]
            name: String,
        }

        let empty = Context::new(request("/").body(Bytes::new()).unwrap());
        assert!(matches!(empty.bind_json::<Body>(), Err(HttpError::Decode(_))));

        let bad = Context::new(request("/").body(Bytes::from_static(b"{nope")).unwrap());
        assert!(matches!(bad.bind_json::<Body>(), Err(HttpError::Decode(_))));

        let good = Context::new(
            request("/")
                .body(Bytes::from_static(br#"{"name":"ada"}"#))
                .unwrap(),
        );
        assert!(good.bind_json::<Body>().is_ok());
    }

    #[test]
    fn test_form_values() {
        let ctx = Context::new(
            request("/")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Bytes::from_static(b"name=John+Doe&age=30"))
                .unwrap(),
        );
        assert_eq!(ctx.form_value("name").as_deref(), Some("John Doe"));
        assert_eq!(ctx.form_value("missing"), None);
    }

    #[test]
    fn test_client_ip_precedence() {
        let mut ctx = Context::new(request("/").body(Bytes::new()).unwrap());
        ctx.set_peer_addr(Some("192.168.1.9:5000".parse().unwrap()));
        assert_eq!(ctx.client_ip().as_deref(), Some("192.168.1.9"));

        let mut ctx = Context::new(
            request("/")
                .header(X_REAL_IP, "10.1.1.1")
                .body(Bytes::new())
                .unwrap(),
        );
        ctx.set_peer_addr(Some("192.168.1.9:5000".parse().unwrap()));
        assert_eq!(ctx.client_ip().as_deref(), Some("10.1.1.1"));
    }

    #[test]
    fn test_cookies() {
        let ctx = Context::new(
            request("/")
                .header("cookie", "session=abc; theme=\"dark\"")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(ctx.cookie("session").as_deref(), Some("abc"));
        assert_eq!(ctx.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_value_bag() {
        let mut ctx = Context::new(request("/").body(Bytes::new()).unwrap());
        ctx.set("tenant", "acme".to_string());
        assert_eq!(ctx.get::<String>("tenant").map(String::as_str), Some("acme"));
        assert!(ctx.get::<u32>("tenant").is_none());
        assert!(ctx.contains_key("tenant"));
    }

    #[tokio::test]
    async fn test_form_file() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             hello\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{boundary}--\r\n"
        );
        let ctx = Context::new(
            request("/upload")
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Bytes::from(body))
                .unwrap(),
        );

        let file = ctx.form_file("avatar").await.unwrap();
        assert_eq!(file.file_name.as_deref(), Some("me.png"));
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(&file.data[..], b"PNGDATA");

        assert!(matches!(
            ctx.form_file("resume").await,
            Err(HttpError::NotFound(_))
        ));
    }
}
