//! Request propagation context.
//!
//! The [`RequestContext`] travels with a request through middleware and into
//! handlers and queue jobs. It carries the trace identifier, the
//! authenticated caller, an optional deadline, a cancellation signal and a
//! typed value bag.

use std::time::Duration;

use futures_util::future::select_all;
use http::Extensions;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::auth::AuthInfo;
use crate::shutdown::ShutdownSignal;

/// Well-known header used to propagate the trace identifier.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was cancelled explicitly.
    #[error("context canceled")]
    Cancelled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Per-request propagation context.
///
/// Clones share cancellation: cancelling one clone cancels all of them.
/// [`RequestContext::child`] derives a context that observes its parent's
/// cancellation but can also be cancelled on its own.
///
/// # Example
///
/// ```
/// use daedalus_core::RequestContext;
/// use std::time::Duration;
///
/// let ctx = RequestContext::new().with_trace_id("abc123");
/// assert_eq!(ctx.trace_id(), "abc123");
///
/// let bounded = ctx.child().with_timeout(Duration::from_secs(5));
/// assert!(bounded.deadline().is_some());
/// assert!(ctx.deadline().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace identifier propagated via [`TRACE_ID_HEADER`].
    trace_id: String,

    /// Authenticated caller, set by the auth middleware.
    auth: Option<AuthInfo>,

    /// Point in time after which the context is done.
    deadline: Option<Instant>,

    /// Cancellation lineage; the last entry belongs to this context.
    cancel: Vec<ShutdownSignal>,

    /// Typed values for cross-middleware communication.
    values: Extensions,
}

impl RequestContext {
    /// Creates a root context with a fresh UUID v7 trace id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::now_v7().simple().to_string(),
            auth: None,
            deadline: None,
            cancel: vec![ShutdownSignal::new()],
            values: Extensions::new(),
        }
    }

    /// Derives a child context.
    ///
    /// The child shares trace id, auth, deadline and values. Cancelling the
    /// child does not cancel the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut cancel = self.cancel.clone();
        cancel.push(ShutdownSignal::new());
        Self {
            trace_id: self.trace_id.clone(),
            auth: self.auth.clone(),
            deadline: self.deadline,
            cancel,
            values: self.values.clone(),
        }
    }

    /// Returns the trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Sets the trace identifier.
    pub fn set_trace_id(&mut self, trace_id: impl Into<String>) {
        self.trace_id = trace_id.into();
    }

    /// Returns a new context with the specified trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Returns the authenticated caller, if any.
    #[must_use]
    pub const fn auth(&self) -> Option<&AuthInfo> {
        self.auth.as_ref()
    }

    /// Returns the authenticated user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.auth.as_ref().map(AuthInfo::user_id)
    }

    /// Sets the authenticated caller.
    pub fn set_auth(&mut self, auth: AuthInfo) {
        self.auth = Some(auth);
    }

    /// Returns a new context with the specified auth info.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Returns the deadline, if one is bound.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Binds a deadline; an earlier existing deadline is kept.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    /// Returns a new context bounded by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.set_deadline(deadline);
        self
    }

    /// Returns a new context bounded by `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        if let Some(own) = self.cancel.last() {
            own.trigger();
        }
    }

    /// Returns `true` if this context or an ancestor was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(ShutdownSignal::is_shutdown)
    }

    /// Returns why the context is done, or `None` while it is live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes when the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        let cancelled = select_all(self.cancel.iter().map(|s| Box::pin(s.recv())));
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = cancelled => ContextError::Cancelled,
                    () = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }

    /// Stores a typed value, returning the previous one of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values.insert(value)
    }

    /// Returns a typed value.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// Returns `true` when both handles belong to the same logical context.
    ///
    /// Two contexts are the same when they share a trace id and the same
    /// cancellation signal.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        let same_signal = match (self.cancel.last(), other.cancel.last()) {
            (Some(a), Some(b)) => a.same_signal(b),
            _ => false,
        };
        same_signal
            && self.trace_id == other.trace_id
            && self.auth == other.auth
            && self.deadline == other.deadline
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
