//! Redis list backend.

use async_trait::async_trait;
use daedalus_core::RequestContext;
use redis::aio::MultiplexedConnection;

use crate::error::{QueueError, QueueResult};
use crate::queue::Queue;

/// Seconds `BLPOP` blocks before reporting an empty queue.
const POP_BLOCK_SECONDS: u64 = 1;

/// A queue stored in a Redis list.
///
/// Producers `LPUSH`; the consumer `BLPOP`s with a one-second block, so
/// an idle queue yields `Ok(None)` once per second.
#[derive(Clone)]
pub struct RedisListQueue {
    conn: MultiplexedConnection,
    key: String,
}

impl std::fmt::Debug for RedisListQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisListQueue")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RedisListQueue {
    /// Wraps an existing connection.
    pub fn new(conn: MultiplexedConnection, key: impl Into<String>) -> Self {
        Self { conn, key: key.into() }
    }

    /// Opens a connection to `url` and uses the list at `key`.
    pub async fn connect(url: &str, key: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(url).map_err(QueueError::backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::backend)?;
        Ok(Self::new(conn, key))
    }

    /// Returns the list key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Queue for RedisListQueue {
    async fn push(&self, _ctx: &RequestContext, payload: Vec<u8>) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _len: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::backend)?;
        Ok(())
    }

    async fn pop(&self, _ctx: &RequestContext) -> QueueResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(&self.key)
            .arg(POP_BLOCK_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::backend)?;
        Ok(reply.map(|(_key, payload)| payload))
    }
}
