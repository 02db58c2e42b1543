//! Responders on [`Context`].
//!
//! Every responder writes the one response body. A second write returns
//! [`HttpError::AlreadyWritten`] and leaves the first body in place.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use daedalus_core::TRACE_ID_HEADER;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Response, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::context::Context;
use crate::error::{HttpError, HttpResult};

/// Response body type produced by the engine adapter.
pub type ResponseBody = Full<Bytes>;

/// Response type produced by the engine adapter.
pub type HttpResponse = Response<ResponseBody>;

#[derive(Debug)]
pub(crate) struct ResponseState {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
}

impl Default for ResponseState {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

impl Context {
    /// Sets the response status without writing a body.
    pub fn status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Returns the response status.
    #[must_use]
    pub const fn response_status(&self) -> StatusCode {
        self.response.status
    }

    /// Returns the response headers.
    #[must_use]
    pub const fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Returns true once a body has been written.
    #[must_use]
    pub const fn written(&self) -> bool {
        self.response.body.is_some()
    }

    /// Returns the status the client will see for a chain result.
    ///
    /// An error that has not yet been rendered maps to its own status.
    #[must_use]
    pub fn outcome_status(&self, result: &HttpResult) -> StatusCode {
        match result {
            Err(err) if !self.written() => err.status_code(),
            _ => self.response.status,
        }
    }

    /// Sets a response header.
    pub fn set_header(&mut self, name: &str, value: &str) -> HttpResult {
        let name = HeaderName::try_from(name)
            .map_err(|e| HttpError::internal(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value)
            .map_err(|e| HttpError::internal(format!("invalid header value: {e}")))?;
        self.response.headers.insert(name, value);
        Ok(())
    }

    /// Writes raw bytes with a content type.
    pub fn data(
        &mut self,
        status: StatusCode,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        let value = HeaderValue::try_from(content_type)
            .map_err(|e| HttpError::internal(format!("invalid content type: {e}")))?;
        self.response.headers.insert(header::CONTENT_TYPE, value);
        self.response.status = status;
        self.response.body = Some(body.into());
        Ok(())
    }

    /// Writes a JSON body.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        let body = serde_json::to_vec(value)
            .map_err(|e| HttpError::internal(format!("failed to serialize response: {e}")))?;
        self.data(status, mime::APPLICATION_JSON.as_ref(), body)
    }

    /// Writes a plain-text body.
    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> HttpResult {
        self.data(status, mime::TEXT_PLAIN_UTF_8.as_ref(), body.into())
    }

    /// Writes a formatted plain-text body.
    ///
    /// ```ignore
    /// ctx.string(StatusCode::OK, format_args!("hello {name}"))?;
    /// ```
    pub fn string(&mut self, status: StatusCode, args: fmt::Arguments<'_>) -> HttpResult {
        self.text(status, args.to_string())
    }

    /// Renders the template `name` with the configured renderer.
    pub fn html<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        name: &str,
        data: &T,
    ) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        let renderer = self
            .renderer()
            .cloned()
            .ok_or_else(|| HttpError::Render("no renderer configured".to_string()))?;
        let data = serde_json::to_value(data)
            .map_err(|e| HttpError::Render(format!("template data: {e}")))?;
        let body = renderer.render(name, &data)?;
        self.data(status, mime::TEXT_HTML_UTF_8.as_ref(), body)
    }

    /// Sends a file inline with a content type guessed from its extension.
    pub async fn file(&mut self, path: impl AsRef<Path>) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        let path = path.as_ref();
        let contents = read_file(path).await?;
        self.data(StatusCode::OK, content_type_for(path), contents)
    }

    /// Sends a file as a download named `filename`.
    pub async fn attachment(&mut self, path: impl AsRef<Path>, filename: &str) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
        self.set_header(header::CONTENT_DISPOSITION.as_str(), &disposition)?;
        self.file(path).await
    }

    /// Redirects to `location`. `status` should be a 3xx code.
    pub fn redirect(&mut self, status: StatusCode, location: &str) -> HttpResult {
        if self.written() {
            return Err(HttpError::AlreadyWritten);
        }
        if !status.is_redirection() {
            return Err(HttpError::internal(format!(
                "cannot redirect with status {status}"
            )));
        }
        self.set_header(header::LOCATION.as_str(), location)?;
        self.response.status = status;
        self.response.body = Some(Bytes::new());
        Ok(())
    }

    /// Renders an error as the JSON failure body unless a body exists.
    pub(crate) fn write_error(&mut self, err: &HttpError) {
        let status = err.status_code();
        let trace_id = self.request_context().trace_id().to_string();

        if status.is_server_error() {
            tracing::error!(
                path = %self.full_path(),
                status = status.as_u16(),
                trace_id = %trace_id,
                error = %err,
                "handler failed"
            );
        } else {
            tracing::info!(
                path = %self.full_path(),
                status = status.as_u16(),
                trace_id = %trace_id,
                error = %err,
                "request rejected"
            );
        }

        if self.written() {
            return;
        }
        if let Some(seconds) = err.retry_after_seconds() {
            self.response
                .headers
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        let _ = self.json(status, &err.to_envelope(&trace_id));
    }

    /// Converts the written response into an `http::Response`.
    pub(crate) fn into_response(self) -> HttpResponse {
        let trace_id = self.request_context().trace_id().to_string();
        let ResponseState {
            status,
            mut headers,
            body,
        } = self.response;

        if !headers.contains_key(TRACE_ID_HEADER) {
            if let Ok(value) = HeaderValue::try_from(trace_id) {
                headers.insert(TRACE_ID_HEADER, value);
            }
        }

        let mut response = Response::new(Full::new(body.unwrap_or_default()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

async fn read_file(path: &Path) -> HttpResult<Bytes> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Bytes::from(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HttpError::not_found(format!("file '{}'", path.display())))
        }
        Err(e) => Err(HttpError::Io(e)),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    fn ctx() -> Context {
        Context::new(Request::get("/").body(Bytes::new()).unwrap())
    }

    #[test]
    fn test_write_once() {
        let mut ctx = ctx();
        ctx.text(StatusCode::OK, "first").unwrap();

        let second = ctx.json(StatusCode::CREATED, &serde_json::json!({"a": 1}));
        assert!(matches!(second, Err(HttpError::AlreadyWritten)));

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_string_formats() {
        let mut ctx = ctx();
        let name = "ada";
        ctx.string(StatusCode::OK, format_args!("hello {name}")).unwrap();
        assert_eq!(ctx.response.body.as_deref(), Some(&b"hello ada"[..]));
    }

    #[test]
    fn test_redirect() {
        let mut ctx = ctx();
        assert!(ctx.redirect(StatusCode::OK, "/x").is_err());
        ctx.redirect(StatusCode::FOUND, "/login").unwrap();
        assert_eq!(ctx.response_status(), StatusCode::FOUND);
        assert_eq!(ctx.response_headers()[header::LOCATION], "/login");
    }

    #[test]
    fn test_html_without_renderer() {
        let mut ctx = ctx();
        let result = ctx.html(StatusCode::OK, "index", &serde_json::json!({}));
        assert!(matches!(result, Err(HttpError::Render(_))));
        assert!(!ctx.written());
    }

    #[test]
    fn test_write_error_keeps_existing_body() {
        let mut ctx = ctx();
        ctx.text(StatusCode::ACCEPTED, "done").unwrap();
        ctx.write_error(&HttpError::internal("late failure"));
        assert_eq!(ctx.response_status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_write_error_envelope() {
        let mut ctx = ctx();
        let err = HttpError::from(daedalus_core::DaedalusError::rate_limited("slow down", Some(4)));
        ctx.write_error(&err);

        let response = ctx.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "4");
        assert!(response.headers().contains_key(TRACE_ID_HEADER));
    }

    #[tokio::test]
    async fn test_file_and_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let mut inline = ctx();
        inline.file(&path).await.unwrap();
        assert_eq!(
            inline.response_headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );

        let mut download = ctx();
        download.attachment(&path, "q3.csv").await.unwrap();
        assert_eq!(
            download.response_headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"q3.csv\""
        );

        let mut missing = ctx();
        let result = missing.file(dir.path().join("nope.txt")).await;
        assert!(matches!(result, Err(HttpError::NotFound(_))));
    }
}
