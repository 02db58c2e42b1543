//! In-memory request dispatch for tests.
//!
//! [`Router::test`] runs a request through the full middleware chain
//! without a listener and returns a buffered [`TestResponse`].

use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

use crate::carrier::ensure_context;
use crate::response::HttpResponse;
use crate::router::Router;

impl Router {
    /// Dispatches `request` in memory.
    ///
    /// When `timeout_ms > 0` the request's [`RequestContext`] is cancelled
    /// after that many milliseconds; the handler still runs to completion
    /// so its reaction to the cancellation is observable.
    ///
    /// [`RequestContext`]: daedalus_core::RequestContext
    ///
    /// # Example
    ///
    /// ```rust
    /// use daedalus_http::{handler_fn, Router};
    /// use http::{Request, StatusCode};
    ///
    /// # tokio_test::block_on(async {
    /// let mut router = Router::new();
    /// router.get("/ping", handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })));
    ///
    /// let response = router
    ///     .test(Request::get("/ping").body(bytes::Bytes::new()).unwrap(), 0)
    ///     .await;
    /// response.assert_status(StatusCode::OK).assert_body_eq("pong");
    /// # });
    /// ```
    pub async fn test(&self, mut request: Request<Bytes>, timeout_ms: u64) -> TestResponse {
        let request_ctx = ensure_context(&mut request);
        let dispatch = self.handle(request, None);
        tokio::pin!(dispatch);

        let response = if timeout_ms > 0 {
            tokio::select! {
                response = dispatch.as_mut() => response,
                () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                    request_ctx.cancel();
                    dispatch.as_mut().await
                }
            }
        } else {
            dispatch.as_mut().await
        };

        TestResponse::from_response(response).await
    }
}

/// A buffered response with assertion helpers.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Buffers an engine response.
    pub async fn from_response(response: HttpResponse) -> Self {
        let (parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Deserializes the body as a JSON value.
    pub fn json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.json()
    }

    /// Asserts the status code.
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected status {expected}, got {} with body {}",
            self.status,
            self.text()
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self
            .header(name)
            .unwrap_or_else(|| panic!("header '{name}' not found"));
        assert_eq!(actual, expected, "header '{name}' mismatch");
        self
    }

    /// Asserts the body equals `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the body differs.
    pub fn assert_body_eq(&self, expected: &str) -> &Self {
        assert_eq!(self.text(), expected, "body mismatch");
        self
    }

    /// Asserts the body contains `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the substring is absent.
    pub fn assert_body_contains(&self, expected: &str) -> &Self {
        let body = self.text();
        assert!(body.contains(expected), "body should contain '{expected}', got: {body}");
        self
    }

    /// Asserts the body is a failure envelope with `code`.
    ///
    /// # Panics
    ///
    /// Panics if the body is not an envelope or the code differs.
    pub fn assert_error_code(&self, code: &str) -> &Self {
        let value = self
            .json_value()
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {}", self.text()));
        assert_eq!(value["code"], code, "error code mismatch in {value}");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::handler::handler_fn;
    use serde_json::json;

    fn get(path: &str) -> Request<Bytes> {
        Request::get(path).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_json_response() {
        let mut router = Router::new();
        router.get(
            "/users/:id",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    ctx.json(StatusCode::OK, &json!({ "id": id, "pattern": ctx.full_path() }))
                })
            }),
        );

        let response = router.test(get("/users/7"), 0).await;
        response.assert_status(StatusCode::OK);
        let body = response.json_value().unwrap();
        assert_eq!(body["id"], "7");
        assert_eq!(body["pattern"], "/users/:id");
        assert!(response.content_type().unwrap().starts_with("application/json"));
    }

    #[tokio::test]
    async fn test_timeout_cancels_context() {
        let mut router = Router::new();
        router.get(
            "/wait",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let request_ctx = ctx.request_context();
                    request_ctx.done().await;
                    Err(HttpError::status(StatusCode::GATEWAY_TIMEOUT, "cancelled"))
                })
            }),
        );

        let response = router.test(get("/wait"), 20).await;
        response
            .assert_status(StatusCode::GATEWAY_TIMEOUT)
            .assert_error_code("TIMEOUT");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_envelope() {
        let mut router = Router::new();
        router.get(
            "/boom",
            handler_fn(|_ctx| Box::pin(async move { Err(HttpError::internal("database down")) })),
        );

        let request = Request::get("/boom")
            .header("x-trace-id", "t-boom")
            .body(Bytes::new())
            .unwrap();
        let response = router.test(request, 0).await;
        response
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
            .assert_error_code("INTERNAL_ERROR")
            .assert_header("x-trace-id", "t-boom");
        assert_eq!(response.json_value().unwrap()["trace_id"], "t-boom");
    }
}
