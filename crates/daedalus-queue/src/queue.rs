//! Queue backends.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use daedalus_core::RequestContext;
use parking_lot::Mutex;

use crate::error::QueueResult;

/// A byte queue the consumer loop pulls from.
///
/// `pop` returns `Ok(None)` when nothing is queued; an empty queue is not
/// an error. The consumer loop treats an empty payload the same way.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    /// Appends a payload.
    async fn push(&self, ctx: &RequestContext, payload: Vec<u8>) -> QueueResult<()>;

    /// Removes the oldest payload, if any.
    async fn pop(&self, ctx: &RequestContext) -> QueueResult<Option<Vec<u8>>>;
}

#[async_trait]
impl<Q: Queue + ?Sized> Queue for Arc<Q> {
    async fn push(&self, ctx: &RequestContext, payload: Vec<u8>) -> QueueResult<()> {
        (**self).push(ctx, payload).await
    }

    async fn pop(&self, ctx: &RequestContext) -> QueueResult<Option<Vec<u8>>> {
        (**self).pop(ctx).await
    }
}

/// An in-process FIFO queue.
///
/// # Example
///
/// ```rust
/// use daedalus_core::RequestContext;
/// use daedalus_queue::{MemoryQueue, Queue};
///
/// # tokio_test::block_on(async {
/// let queue = MemoryQueue::new();
/// let ctx = RequestContext::new();
/// queue.push(&ctx, b"a".to_vec()).await.unwrap();
/// assert_eq!(queue.pop(&ctx).await.unwrap(), Some(b"a".to_vec()));
/// assert_eq!(queue.pop(&ctx).await.unwrap(), None);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of queued payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, _ctx: &RequestContext, payload: Vec<u8>) -> QueueResult<()> {
        self.items.lock().push_back(payload);
        Ok(())
    }

    async fn pop(&self, _ctx: &RequestContext) -> QueueResult<Option<Vec<u8>>> {
        Ok(self.items.lock().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_fifo() {
        let queue = MemoryQueue::new();
        let ctx = RequestContext::new();
        assert!(queue.is_empty());

        queue.push(&ctx, b"one".to_vec()).await.unwrap();
        queue.push(&ctx, b"two".to_vec()).await.unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop(&ctx).await.unwrap().as_deref(), Some(&b"one"[..]));
        assert_eq!(queue.pop(&ctx).await.unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(queue.pop(&ctx).await.unwrap(), None);
    }
}
