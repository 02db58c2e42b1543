//! # Daedalus Queue
//!
//! A pull-based queue consumer engine.
//!
//! The pieces:
//!
//! 1. **Codec**: [`JsonCodec`] or [`ProstCodec`] turns queue bytes into a typed message
//! 2. **Queue**: [`MemoryQueue`], or `RedisListQueue` with the `redis` feature
//! 3. **Worker pool**: [`WorkerPool`] bounds concurrent handlers and fails fast when full
//! 4. **Server**: [`QueueServer`] ties them together behind [`daedalus_core::Server`]
//!
//! ## Consumer loop
//!
//! ```text
//! pop ──► empty? ──yes──► sleep(emptySleepInterval)
//!          │
//!          no
//!          ▼
//!       decode ──error──► log, drop
//!          │
//!          ▼
//!     pool.submit(handle) ──saturated──► log, drop
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use daedalus_core::{RequestContext, Server};
//! use daedalus_queue::{JsonCodec, MemoryQueue, QueueConfig, QueueServer};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Order {
//!     id: u64,
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = QueueServer::new(
//!     &QueueConfig::new("orders").with_pool_size(16),
//!     MemoryQueue::new(),
//!     JsonCodec::<Order>::new(),
//!     |_ctx: RequestContext, order: Order| async move {
//!         tracing::info!(order_id = order.id, "processing order");
//!         anyhow::Ok(())
//!     },
//! )?;
//!
//! // Blocks until `server.stop()` is called from another task.
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-queue/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod codec;
mod config;
mod error;
mod pool;
mod queue;
#[cfg(feature = "redis")]
mod redis_list;
mod server;

pub use codec::{Codec, JsonCodec, ProstCodec};
pub use config::{parse_duration, QueueConfig, DEFAULT_EMPTY_SLEEP_INTERVAL};
pub use error::{PoolError, PoolResult, QueueError, QueueResult};
pub use pool::{WorkerPool, DEFAULT_POOL_SIZE};
pub use queue::{MemoryQueue, Queue};
#[cfg(feature = "redis")]
pub use redis_list::RedisListQueue;
pub use server::{QueueHandler, QueueServer};
