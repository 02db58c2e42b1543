//! Background OS signal listener.

use std::future::Future;

use daedalus_core::shutdown::wait_for_os_signal;
use tokio::task::JoinHandle;

use crate::registry::StopRegistry;

/// Waits for SIGINT or SIGTERM, then drains a [`StopRegistry`].
///
/// There is one listener per process. Dropping it stops listening.
#[derive(Debug)]
pub struct SignalListener {
    handle: JoinHandle<usize>,
}

impl SignalListener {
    /// Spawns the listener on the current Tokio runtime.
    #[must_use]
    pub fn spawn(registry: StopRegistry) -> Self {
        Self::spawn_with(registry, wait_for_os_signal())
    }

    /// Spawns a listener that drains `registry` when `trigger` completes.
    #[must_use]
    pub fn spawn_with<F>(registry: StopRegistry, trigger: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            trigger.await;
            let stopped = registry.stop_all().await;
            tracing::info!(stopped, "shutdown signal handled");
            stopped
        });
        Self { handle }
    }

    /// Returns `true` once the registry has been drained.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the listener to finish and returns how many stops ran.
    pub async fn join(mut self) -> usize {
        (&mut self.handle).await.unwrap_or(0)
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_trigger_drains_registry_once() {
        let registry = StopRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            registry.register(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let (tx, rx) = oneshot::channel::<()>();
        let listener = SignalListener::spawn_with(registry.clone(), async move {
            let _ = rx.await;
        });
        assert!(!listener.is_finished());

        tx.send(()).unwrap();
        assert_eq!(listener.join().await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.stop_all().await, 0);
    }

    #[tokio::test]
    async fn test_drop_aborts_listener() {
        let registry = StopRegistry::new();
        registry.register(|| async {});

        let listener = SignalListener::spawn_with(registry.clone(), std::future::pending());
        drop(listener);
        tokio::task::yield_now().await;

        assert!(!registry.is_drained());
        assert_eq!(registry.len(), 1);
    }
}
