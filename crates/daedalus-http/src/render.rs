//! Pluggable template rendering for [`Context::html`](crate::Context::html).

use serde_json::Value;

use crate::error::HttpError;

/// Renders a named template with JSON data.
///
/// Install one with [`Router::set_renderer`](crate::Router::set_renderer).
pub trait Renderer: Send + Sync + 'static {
    /// Renders `name` with `data` into an HTML string.
    fn render(&self, name: &str, data: &Value) -> Result<String, HttpError>;
}

impl<F> Renderer for F
where
    F: Fn(&str, &Value) -> Result<String, HttpError> + Send + Sync + 'static,
{
    fn render(&self, name: &str, data: &Value) -> Result<String, HttpError> {
        self(name, data)
    }
}
