//! The queue consumer server.
//!
//! [`QueueServer`] pulls payloads from a [`Queue`], decodes them with a
//! [`Codec`] and runs the [`QueueHandler`] for each one on a
//! [`WorkerPool`]. Failures at any step are logged and the loop moves on.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daedalus_core::{DaedalusError, DaedalusResult, RequestContext, Server, ShutdownSignal};
use daedalus_telemetry::{record_queue_message, QueueOutcome};

use crate::codec::Codec;
use crate::config::QueueConfig;
use crate::error::QueueResult;
use crate::pool::WorkerPool;
use crate::queue::Queue;

/// Processes one decoded message.
///
/// Implemented for any `Fn(RequestContext, T) -> impl Future<Output = anyhow::Result<()>>`.
#[async_trait]
pub trait QueueHandler<T>: Send + Sync + 'static {
    /// Handles `message`. Errors are logged by the server.
    async fn handle(&self, ctx: RequestContext, message: T) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, F, Fut> QueueHandler<T> for F
where
    T: Send + 'static,
    F: Fn(RequestContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: RequestContext, message: T) -> anyhow::Result<()> {
        (self)(ctx, message).await
    }
}

/// A pull-based consumer over a queue.
///
/// # Example
///
/// ```rust,no_run
/// use daedalus_core::Server;
/// use daedalus_queue::{JsonCodec, MemoryQueue, QueueConfig, QueueServer};
/// use daedalus_core::RequestContext;
///
/// # async fn run() -> anyhow::Result<()> {
/// let server = QueueServer::new(
///     &QueueConfig::new("emails"),
///     MemoryQueue::new(),
///     JsonCodec::<String>::new(),
///     |_ctx: RequestContext, address: String| async move {
///         tracing::info!(%address, "sending");
///         anyhow::Ok(())
///     },
/// )?;
/// server.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct QueueServer<T> {
    name: String,
    queue: Arc<dyn Queue>,
    codec: Arc<dyn Codec<T>>,
    handler: Arc<dyn QueueHandler<T>>,
    pool: WorkerPool,
    empty_sleep_interval: Duration,
    started: AtomicBool,
    done: ShutdownSignal,
    exited: ShutdownSignal,
}

impl<T> std::fmt::Debug for QueueServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueServer")
            .field("name", &self.name)
            .field("pool", &self.pool)
            .field("empty_sleep_interval", &self.empty_sleep_interval)
            .field("done", &self.done.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> QueueServer<T> {
    /// Creates a server from the `queue` config section.
    pub fn new<Q, C, H>(config: &QueueConfig, queue: Q, codec: C, handler: H) -> QueueResult<Self>
    where
        Q: Queue,
        C: Codec<T>,
        H: QueueHandler<T>,
    {
        config.validate()?;
        Ok(Self {
            name: config.queue_name.clone(),
            queue: Arc::new(queue),
            codec: Arc::new(codec),
            handler: Arc::new(handler),
            pool: WorkerPool::new(config.pool_size),
            empty_sleep_interval: config.empty_sleep_interval,
            started: AtomicBool::new(false),
            done: ShutdownSignal::new(),
            exited: ShutdownSignal::new(),
        })
    }

    /// Overrides the name used in logs and metrics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the worker pool.
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    async fn idle(&self) {
        tokio::select! {
            () = tokio::time::sleep(self.empty_sleep_interval) => {}
            () = self.done.recv() => {}
        }
    }

    async fn run(&self) {
        let ctx = RequestContext::new();

        while !self.done.is_shutdown() {
            let payload = match self.queue.pop(&ctx).await {
                Ok(Some(payload)) if !payload.is_empty() => payload,
                Ok(_) => {
                    self.idle().await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(queue = %self.name, error = %e, "failed to pop message");
                    self.idle().await;
                    continue;
                }
            };

            let message = match self.codec.decode(&payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(queue = %self.name, error = %e, bytes = payload.len(), "dropping undecodable message");
                    record_queue_message(&self.name, QueueOutcome::DecodeError);
                    continue;
                }
            };

            if self.done.is_shutdown() {
                tracing::debug!(queue = %self.name, "stopped before dispatch, dropping message");
                break;
            }

            let handler = Arc::clone(&self.handler);
            let name = self.name.clone();
            let submitted = self.pool.submit(async move {
                let msg_ctx = RequestContext::new();
                let trace_id = msg_ctx.trace_id().to_string();
                match handler.handle(msg_ctx, message).await {
                    Ok(()) => record_queue_message(&name, QueueOutcome::Handled),
                    Err(e) => {
                        tracing::error!(queue = %name, trace_id = %trace_id, error = %e, "queue handler failed");
                        record_queue_message(&name, QueueOutcome::Failed);
                    }
                }
            });
            if let Err(e) = submitted {
                tracing::warn!(queue = %self.name, error = %e, "failed to submit message");
                record_queue_message(&self.name, QueueOutcome::Rejected);
            }
        }
    }
}

/// Triggers the wrapped signal when dropped.
struct ExitGuard<'a>(&'a ShutdownSignal);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

#[async_trait]
impl<T: Send + 'static> Server for QueueServer<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> DaedalusResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DaedalusError::fatal(format!("queue server {} already started", self.name)));
        }
        let _exit = ExitGuard(&self.exited);

        tracing::info!(queue = %self.name, pool_size = self.pool.capacity(), "queue server started");
        self.run().await;
        tracing::info!(queue = %self.name, "queue server stopped");
        Ok(())
    }

    async fn stop(&self) -> DaedalusResult<()> {
        if self.done.trigger() {
            tracing::info!(queue = %self.name, running = self.pool.running(), "queue server stopping");
        }
        if self.started.load(Ordering::SeqCst) {
            self.exited.recv().await;
        }
        self.pool.wait_idle().await;
        self.pool.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::queue::MemoryQueue;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Debug, Serialize, Deserialize)]
    struct Job {
        id: u64,
        body: String,
    }

    async fn eventually(mut check: impl FnMut() -> bool, within: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < within {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_happy_path_then_stop() {
        let queue = Arc::new(MemoryQueue::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<(u64, String)>::new()));

        let sink = Arc::clone(&seen);
        let server = Arc::new(
            QueueServer::new(
                &QueueConfig::new("jobs"),
                Arc::clone(&queue),
                JsonCodec::<Job>::new(),
                move |_ctx: RequestContext, job: Job| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock().push((job.id, job.body));
                        anyhow::Ok(())
                    }
                },
            )
            .unwrap(),
        );
        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });

        let ctx = RequestContext::new();
        queue.push(&ctx, br#"{"id":1,"body":"x"}"#.to_vec()).await.unwrap();
        assert!(eventually(|| seen.lock().len() == 1, Duration::from_millis(100)).await);
        assert_eq!(seen.lock()[0], (1, "x".to_string()));

        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();

        queue.push(&ctx, br#"{"id":2,"body":"y"}"#.to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dropped() {
        let queue = Arc::new(MemoryQueue::new());
        let handled = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&handled);
        let server = Arc::new(
            QueueServer::new(
                &QueueConfig::new("jobs"),
                Arc::clone(&queue),
                JsonCodec::<Job>::new(),
                move |_ctx: RequestContext, _job: Job| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { anyhow::Ok(()) }
                },
            )
            .unwrap(),
        );

        let ctx = RequestContext::new();
        queue.push(&ctx, b"garbage".to_vec()).await.unwrap();
        queue.push(&ctx, br#"{"id":3,"body":"z"}"#.to_vec()).await.unwrap();

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });
        assert!(eventually(|| handled.load(Ordering::SeqCst) == 1, Duration::from_secs(1)).await);
        assert!(queue.is_empty());

        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    /// JSON codec that counts decode attempts.
    struct CountingCodec(Arc<AtomicUsize>);

    impl Codec<Job> for CountingCodec {
        fn encode(&self, _value: &Job) -> QueueResult<Vec<u8>> {
            Ok(Vec::new())
        }

        fn decode(&self, bytes: &[u8]) -> QueueResult<Job> {
            self.0.fetch_add(1, Ordering::SeqCst);
            JsonCodec::<Job>::new().decode(bytes)
        }
    }

    #[tokio::test]
    async fn test_empty_payload_is_treated_as_idle() {
        let queue = Arc::new(MemoryQueue::new());
        let decoded = Arc::new(AtomicUsize::new(0));
        let handled = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&handled);
        let server = Arc::new(
            QueueServer::new(
                &QueueConfig::new("jobs"),
                Arc::clone(&queue),
                CountingCodec(Arc::clone(&decoded)),
                move |_ctx: RequestContext, _job: Job| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { anyhow::Ok(()) }
                },
            )
            .unwrap(),
        );

        let ctx = RequestContext::new();
        queue.push(&ctx, Vec::new()).await.unwrap();
        queue.push(&ctx, br#"{"id":4,"body":"w"}"#.to_vec()).await.unwrap();

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });
        assert!(eventually(|| handled.load(Ordering::SeqCst) == 1, Duration::from_secs(1)).await);
        assert_eq!(decoded.load(Ordering::SeqCst), 1);

        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_does_not_stop_loop() {
        let queue = Arc::new(MemoryQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let server = Arc::new(
            QueueServer::new(
                &QueueConfig::new("jobs"),
                Arc::clone(&queue),
                JsonCodec::<Job>::new(),
                move |_ctx: RequestContext, job: Job| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        anyhow::ensure!(job.id != 1, "job {} failed", job.id);
                        anyhow::Ok(())
                    }
                },
            )
            .unwrap(),
        );
        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });

        let ctx = RequestContext::new();
        queue.push(&ctx, br#"{"id":1,"body":"a"}"#.to_vec()).await.unwrap();
        queue.push(&ctx, br#"{"id":2,"body":"b"}"#.to_vec()).await.unwrap();
        assert!(eventually(|| calls.load(Ordering::SeqCst) == 2, Duration::from_secs(1)).await);

        server.stop().await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_handlers() {
        let queue = Arc::new(MemoryQueue::new());
        let finished = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));

        let (flag, entered) = (Arc::clone(&finished), Arc::clone(&started));
        let server = Arc::new(
            QueueServer::new(
                &QueueConfig::new("slow"),
                Arc::clone(&queue),
                JsonCodec::<Job>::new(),
                move |_ctx: RequestContext, _job: Job| {
                    let (flag, entered) = (Arc::clone(&flag), Arc::clone(&entered));
                    async move {
                        entered.store(true, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        flag.store(true, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                },
            )
            .unwrap(),
        );
        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.start().await }
        });

        queue
            .push(&RequestContext::new(), br#"{"id":1,"body":"x"}"#.to_vec())
            .await
            .unwrap();
        assert!(eventually(|| started.load(Ordering::SeqCst), Duration::from_secs(1)).await);

        server.stop().await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(server.pool().is_closed());
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let server = QueueServer::new(
            &QueueConfig::new("idle"),
            MemoryQueue::new(),
            JsonCodec::<Job>::new(),
            |_ctx: RequestContext, _job: Job| async { anyhow::Ok(()) },
        )
        .unwrap();

        server.stop().await.unwrap();
        server.stop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), server.start())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_missing_queue_name_is_rejected() {
        let result = QueueServer::new(
            &QueueConfig::default(),
            MemoryQueue::new(),
            JsonCodec::<Job>::new(),
            |_ctx: RequestContext, _job: Job| async { anyhow::Ok(()) },
        );
        assert!(result.is_err());
    }
}
