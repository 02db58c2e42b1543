//! Moving the propagation context in and out of request carriers.
//!
//! Lookup priority: the [`Context`] override slot, then the engine-native
//! request extensions, then a raw [`RequestContext`]. When none carries
//! one, [`context_from`] returns a fresh context.

use daedalus_core::{RequestContext, TRACE_ID_HEADER};
use http::{Extensions, Request};

use crate::context::Context;

/// Something a [`RequestContext`] can be read from.
pub trait Carrier {
    /// Returns the carried context, if any.
    fn carried_context(&self) -> Option<RequestContext>;
}

/// Something a [`RequestContext`] can be stored into.
pub trait CarrierMut {
    /// Stores `ctx`, replacing any previous one.
    fn store_context(&mut self, ctx: RequestContext);
}

impl Carrier for Context {
    fn carried_context(&self) -> Option<RequestContext> {
        self.request_context_override()
            .cloned()
            .or_else(|| self.extensions().carried_context())
    }
}

impl CarrierMut for Context {
    fn store_context(&mut self, ctx: RequestContext) {
        self.set_request_context(ctx);
    }
}

impl Carrier for Extensions {
    fn carried_context(&self) -> Option<RequestContext> {
        self.get::<RequestContext>().cloned()
    }
}

impl CarrierMut for Extensions {
    fn store_context(&mut self, ctx: RequestContext) {
        self.insert(ctx);
    }
}

impl<B> Carrier for Request<B> {
    fn carried_context(&self) -> Option<RequestContext> {
        self.extensions().carried_context()
    }
}

impl<B> CarrierMut for Request<B> {
    fn store_context(&mut self, ctx: RequestContext) {
        self.extensions_mut().store_context(ctx);
    }
}

impl Carrier for RequestContext {
    fn carried_context(&self) -> Option<RequestContext> {
        Some(self.clone())
    }
}

impl CarrierMut for RequestContext {
    fn store_context(&mut self, ctx: RequestContext) {
        *self = ctx;
    }
}

/// Extracts the propagation context from `carrier`, or a fresh one.
///
/// # Example
///
/// ```
/// use daedalus_core::RequestContext;
/// use daedalus_http::{context_from, inject_context};
///
/// let mut request = http::Request::new(());
/// inject_context(RequestContext::new().with_trace_id("t-1"), &mut request);
/// assert_eq!(context_from(&request).trace_id(), "t-1");
/// ```
pub fn context_from<C: Carrier + ?Sized>(carrier: &C) -> RequestContext {
    carrier.carried_context().unwrap_or_default()
}

/// Stores `ctx` into `carrier`.
pub fn inject_context<C: CarrierMut + ?Sized>(ctx: RequestContext, carrier: &mut C) {
    carrier.store_context(ctx);
}

/// Returns the request's context, creating and storing one if absent.
///
/// A new context adopts the inbound `x-trace-id` header when present.
pub fn ensure_context<B>(request: &mut Request<B>) -> RequestContext {
    if let Some(existing) = request.carried_context() {
        return existing;
    }
    let mut ctx = RequestContext::new();
    if let Some(trace_id) = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx.set_trace_id(trace_id);
    }
    request.store_context(ctx.clone());
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_override_beats_extensions() {
        let mut request = Request::new(Bytes::new());
        inject_context(RequestContext::new().with_trace_id("native"), &mut request);

        let mut ctx = Context::new(request);
        assert_eq!(context_from(&ctx).trace_id(), "native");

        inject_context(RequestContext::new().with_trace_id("override"), &mut ctx);
        assert_eq!(context_from(&ctx).trace_id(), "override");
        assert_eq!(context_from(ctx.extensions()).trace_id(), "native");
    }

    #[test]
    fn test_raw_context_carrier() {
        let raw = RequestContext::new().with_trace_id("raw");
        let extracted = context_from(&raw);
        assert!(extracted.same_as(&raw));
    }

    #[test]
    fn test_empty_carrier_yields_fresh_context() {
        let request = Request::new(());
        let ctx = context_from(&request);
        assert!(!ctx.trace_id().is_empty());
        assert!(ctx.auth().is_none());
    }

    #[test]
    fn test_ensure_context_adopts_header() {
        let mut request = Request::builder()
            .header(TRACE_ID_HEADER, "abc123")
            .body(())
            .unwrap();
        let first = ensure_context(&mut request);
        let second = ensure_context(&mut request);
        assert_eq!(first.trace_id(), "abc123");
        assert!(first.same_as(&second));
    }

    #[test]
    fn test_cancellation_is_shared_through_carriers() {
        let mut request = Request::new(());
        let ctx = ensure_context(&mut request);
        ctx.cancel();
        assert!(context_from(&request).is_cancelled());
    }
}
