//! A bounded, non-blocking worker pool.
//!
//! [`WorkerPool::submit`] spawns the task on the Tokio runtime if a slot is
//! free and fails fast otherwise. The running count drops when a task
//! finishes, including by panic.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::{PoolError, PoolResult};

/// Default number of concurrent tasks.
pub const DEFAULT_POOL_SIZE: usize = 1000;

#[derive(Debug)]
struct PoolInner {
    capacity: usize,
    running: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
}

/// Bounded task pool.
///
/// # Example
///
/// ```rust
/// use daedalus_queue::WorkerPool;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = WorkerPool::new(2);
/// pool.submit(async { /* work */ }).unwrap();
/// pool.wait_idle().await;
/// assert_eq!(pool.running(), 0);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Creates a pool running at most `capacity` tasks (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity: capacity.max(1),
                running: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    /// Returns the pool capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of tasks currently running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns true once [`release`](Self::release) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Spawns `task` if a slot is free.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<F>(&self, task: F) -> PoolResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slot = self.acquire()?;
        tokio::spawn(async move {
            let _slot = slot;
            task.await;
        });
        Ok(())
    }

    fn acquire(&self) -> PoolResult<Slot> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let capacity = self.inner.capacity;
        self.inner
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |running| {
                (running < capacity).then_some(running + 1)
            })
            .map_err(|_| PoolError::Saturated { capacity })?;
        Ok(Slot {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Waits until no task is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.running() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Closes the pool; later submissions fail with [`PoolError::Closed`].
    pub fn release(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(running = self.running(), "worker pool released");
        }
    }
}

struct Slot {
    inner: Arc<PoolInner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.inner.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
