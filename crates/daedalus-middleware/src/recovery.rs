//! Panic recovery.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use daedalus_core::DaedalusError;
use daedalus_http::{BoxFuture, Context, HandlerResult, HttpError, Middleware, Next};
use futures_util::FutureExt;

/// Catches panics in the rest of the chain and turns them into 500s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

thread_local! {
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Installs, once per process, a panic hook that keeps the stack of the
/// latest panic on the panicking thread. The previous hook still runs.
pub(crate) fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Takes the stack recorded for the latest panic on this thread.
///
/// `catch_unwind` returns on the thread that panicked, so this must run
/// right after it.
pub(crate) fn take_panic_stack() -> String {
    PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        install_panic_hook();
        Box::pin(async move {
            match AssertUnwindSafe(next.run(&mut *ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let stack = take_panic_stack();
                    tracing::error!(
                        path = %ctx.full_path(),
                        trace_id = %ctx.request_context().trace_id(),
                        panic = %message,
                        stack = %stack,
                        "handler panicked"
                    );
                    Err(HttpError::from(DaedalusError::panic(message)))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_stack_recorded_by_hook() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();

        assert_eq!(panic_message(payload.as_ref()), "boom");
        assert!(PANIC_STACK.with(|slot| slot.borrow().is_some()));
        assert!(!take_panic_stack().is_empty());
        assert!(PANIC_STACK.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic payload");
    }
}
