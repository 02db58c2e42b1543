//! Process-wide list of stop functions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

/// A deferred stop action.
pub type StopFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Append-only list of stop functions, drained once.
///
/// The signal listener drains it on SIGINT or SIGTERM. A function registered
/// after the drain runs immediately on a new task, so late servers are
/// still stopped.
///
/// # Example
///
/// ```rust
/// use daedalus_supervisor::StopRegistry;
///
/// # async fn example() {
/// let registry = StopRegistry::new();
/// registry.register(|| async { println!("stopping") });
///
/// assert_eq!(registry.stop_all().await, 1);
/// assert_eq!(registry.stop_all().await, 0);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct StopRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    stops: Mutex<Vec<StopFn>>,
    drained: AtomicBool,
}

impl std::fmt::Debug for StopRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopRegistry")
            .field("pending", &self.len())
            .field("drained", &self.is_drained())
            .finish()
    }
}

impl StopRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stop function.
    pub fn register<F, Fut>(&self, stop: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let stop: StopFn = Box::new(move || stop().boxed());

        let mut stops = self.inner.stops.lock();
        if self.inner.drained.load(Ordering::Acquire) {
            drop(stops);
            tracing::debug!("stop registered after shutdown, running it now");
            tokio::spawn(stop());
            return;
        }
        stops.push(stop);
    }

    /// Runs every registered function once, in registration order.
    ///
    /// Returns how many ran. Later calls return 0.
    pub async fn stop_all(&self) -> usize {
        let stops = {
            let mut stops = self.inner.stops.lock();
            self.inner.drained.store(true, Ordering::Release);
            std::mem::take(&mut *stops)
        };

        let count = stops.len();
        for stop in stops {
            stop().await;
        }
        count
    }

    /// Number of functions waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.stops.lock().len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`stop_all`](Self::stop_all) has run.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.inner.drained.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_all_runs_in_order_once() {
        let registry = StopRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            registry.register(move || async move { order.lock().push(i) });
        }
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.stop_all().await, 3);
        assert_eq!(registry.stop_all().await, 0);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(registry.is_drained());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_late_registration_runs_immediately() {
        let registry = StopRegistry::new();
        registry.stop_all().await;

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        registry.register(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(1), async {
            while ran.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_the_list() {
        let registry = StopRegistry::new();
        let clone = registry.clone();
        clone.register(|| async {});
        assert_eq!(registry.len(), 1);
    }
}
