//! The lifecycle contract shared by every server.

use async_trait::async_trait;

use crate::error::DaedalusResult;

/// A named, startable, stoppable unit of lifecycle.
///
/// Implementations must uphold:
///
/// - `start` blocks until the server terminates or `stop` is invoked.
/// - `stop` is idempotent and safe to call from any task, before or after
///   `start`.
/// - `name` is stable for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use daedalus_core::{DaedalusResult, Server, ShutdownSignal};
///
/// struct Ticker {
///     shutdown: ShutdownSignal,
/// }
///
/// #[async_trait]
/// impl Server for Ticker {
///     fn name(&self) -> &str {
///         "ticker"
///     }
///
///     async fn start(&self) -> DaedalusResult<()> {
///         self.shutdown.recv().await;
///         Ok(())
///     }
///
///     async fn stop(&self) -> DaedalusResult<()> {
///         self.shutdown.trigger();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Server: Send + Sync {
    /// Returns the server name used in logs.
    fn name(&self) -> &str;

    /// Runs the server until it terminates or is stopped.
    async fn start(&self) -> DaedalusResult<()>;

    /// Stops the server. Repeated calls are no-ops.
    async fn stop(&self) -> DaedalusResult<()>;
}
