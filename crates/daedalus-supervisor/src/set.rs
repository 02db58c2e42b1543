//! The server set supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use daedalus_core::{DaedalusError, DaedalusResult, Server};
use parking_lot::RwLock;
use tokio::task::JoinSet;

use crate::registry::StopRegistry;

/// Starts a group of servers in parallel and stops them in order.
///
/// Servers are added during composition. [`start`](ServerSet::start)
/// freezes the set, registers [`stop`](ServerSet::stop) with the stop
/// registry and runs every server's `start` on its own task. It returns
/// once all of them have returned. A server that fails to start is logged
/// and the others keep running.
///
/// # Example
///
/// ```rust,no_run
/// use daedalus_supervisor::{ServerSet, SignalListener, StopRegistry};
/// # use std::sync::Arc;
/// # async fn run(http: Arc<dyn daedalus_core::Server>, queue: Arc<dyn daedalus_core::Server>) {
/// let registry = StopRegistry::new();
/// let _listener = SignalListener::spawn(registry.clone());
///
/// let servers = ServerSet::new().with_stop_registry(registry);
/// servers.add(http).unwrap();
/// servers.add(queue).unwrap();
///
/// // Returns after SIGINT or SIGTERM stops every server.
/// servers.start().await.unwrap();
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ServerSet {
    inner: Arc<SetInner>,
}

#[derive(Default)]
struct SetInner {
    servers: RwLock<Vec<Arc<dyn Server>>>,
    registry: Option<StopRegistry>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ServerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSet")
            .field("servers", &self.names())
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("stopped", &self.inner.stopped.load(Ordering::Acquire))
            .finish()
    }
}

impl ServerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers [`stop`](Self::stop) with `registry` when the set starts.
    ///
    /// Must be called before any clone of the set is taken.
    #[must_use]
    pub fn with_stop_registry(self, registry: StopRegistry) -> Self {
        let servers = std::mem::take(&mut *self.inner.servers.write());
        Self {
            inner: Arc::new(SetInner {
                servers: RwLock::new(servers),
                registry: Some(registry),
                ..SetInner::default()
            }),
        }
    }

    /// Appends a server. Fails once the set has started.
    pub fn add(&self, server: Arc<dyn Server>) -> DaedalusResult<()> {
        if self.inner.started.load(Ordering::Acquire) {
            return Err(DaedalusError::fatal(format!(
                "cannot add server {} after start",
                server.name()
            )));
        }
        tracing::debug!(server = server.name(), "server added");
        self.inner.servers.write().push(server);
        Ok(())
    }

    /// Names of the servers, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner
            .servers
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Number of servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.servers.read().len()
    }

    /// Returns `true` when no server was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts every server and waits for all of them to return.
    pub async fn start(&self) -> DaedalusResult<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(DaedalusError::fatal("server set already started"));
        }
        if self.inner.stopped.load(Ordering::Acquire) {
            tracing::debug!("server set stopped before start");
            return Ok(());
        }

        if let Some(registry) = &self.inner.registry {
            let set = self.clone();
            registry.register(move || async move {
                let _ = set.stop().await;
            });
        }

        let servers = self.inner.servers.read().clone();
        let mut tasks = JoinSet::new();
        for server in servers {
            tracing::info!(server = server.name(), "starting server");
            tasks.spawn(async move {
                let result = server.start().await;
                (server, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((server, Ok(()))) => tracing::info!(server = server.name(), "server exited"),
                Ok((server, Err(e))) => {
                    tracing::error!(server = server.name(), error = %e, "server failed");
                }
                Err(e) => tracing::error!(error = %e, "server task panicked"),
            }
        }
        Ok(())
    }

    /// Stops every server once, in registration order.
    ///
    /// Repeated calls are no-ops. Stop errors are logged.
    pub async fn stop(&self) -> DaedalusResult<()> {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let servers = self.inner.servers.read().clone();
        for server in servers {
            tracing::info!(server = server.name(), "stopping server");
            if let Err(e) = server.stop().await {
                tracing::error!(server = server.name(), error = %e, "server stop failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Server for ServerSet {
    fn name(&self) -> &str {
        "server-set"
    }

    async fn start(&self) -> DaedalusResult<()> {
        ServerSet::start(self).await
    }

    async fn stop(&self) -> DaedalusResult<()> {
        ServerSet::stop(self).await
    }
}
