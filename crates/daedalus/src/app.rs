//! The application owned by `main`.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use daedalus_config::{Config, ConfigError, ConfigHolder, ConfigWatcher, WatchOptions};
use daedalus_core::Server;
use daedalus_http::{HttpServer, Router};
use daedalus_middleware::{install, GrpcMiddlewareLayer};
use daedalus_queue::{Codec, Queue, QueueHandler, QueueServer};
use daedalus_supervisor::{ServerSet, SignalListener, StopRegistry};

/// Process-wide state and the servers it runs.
///
/// `Application` owns what would otherwise be globals: the live config, the
/// stop registry and the signal listener. Servers are built from the config
/// sections, added, and run together until SIGINT or SIGTERM.
///
/// # Example
///
/// ```rust,no_run
/// use daedalus::{handler_fn, Application};
/// use http::StatusCode;
/// use std::sync::Arc;
///
/// # async fn main_() -> anyhow::Result<()> {
/// let app = Application::load("config.toml")?;
/// app.init_logging()?;
///
/// let mut router = app.http_router()?;
/// router.get("/ping", handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "pong") })));
/// app.add_server(Arc::new(app.http_server(router)?))?;
///
/// app.run().await
/// # }
/// ```
pub struct Application {
    config: Arc<ConfigHolder>,
    registry: StopRegistry,
    servers: ServerSet,
    watcher: Option<ConfigWatcher>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .field("servers", &self.servers)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

impl Application {
    /// Creates an application around a fixed config.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_holder(ConfigHolder::new(config))
    }

    /// Loads the config file, `.env` and `DAEDALUS__*` overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let holder = ConfigHolder::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        Ok(Self::with_holder(holder))
    }

    fn with_holder(holder: ConfigHolder) -> Self {
        let registry = StopRegistry::new();
        Self {
            config: Arc::new(holder),
            servers: ServerSet::new().with_stop_registry(registry.clone()),
            registry,
            watcher: None,
        }
    }

    /// Returns the active config.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        self.config.get()
    }

    /// Returns the live config holder.
    #[must_use]
    pub fn config_holder(&self) -> &Arc<ConfigHolder> {
        &self.config
    }

    /// Returns the process-wide stop registry.
    ///
    /// Draining a clone with [`StopRegistry::stop_all`] stops a running
    /// application the same way a signal does.
    #[must_use]
    pub fn stop_registry(&self) -> &StopRegistry {
        &self.registry
    }

    /// Installs the `logger` section as the global tracing subscriber.
    pub fn init_logging(&self) -> anyhow::Result<()> {
        daedalus_telemetry::init_logging(&self.config().logger)?;
        Ok(())
    }

    /// Registers a callback for config reloads.
    pub fn on_config_change<F>(&self, callback: F)
    where
        F: Fn(Result<&Config, &ConfigError>) + Send + Sync + 'static,
    {
        self.config.on_change(callback);
    }

    /// Reloads the config whenever its file changes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch_config(&mut self, options: WatchOptions) -> anyhow::Result<()> {
        self.watcher = Some(self.config.watch(options)?);
        Ok(())
    }

    /// Returns a router with the `http.middlewares` chain installed.
    pub fn http_router(&self) -> anyhow::Result<Router> {
        let config = self.config();
        let http = config.http.as_ref().ok_or(ConfigError::MissingSection("http"))?;

        let mut router = Router::new();
        install(&mut router, &http.middlewares)?;
        Ok(router)
    }

    /// Builds the HTTP server from the `http` section.
    pub fn http_server(&self, router: Router) -> anyhow::Result<HttpServer> {
        let config = self.config();
        let http = config.http.as_ref().ok_or(ConfigError::MissingSection("http"))?;
        Ok(HttpServer::new("http", http.server.clone(), router))
    }

    /// Builds the gRPC middleware layer from the `grpc` section.
    pub fn grpc_layer(&self) -> anyhow::Result<GrpcMiddlewareLayer> {
        let config = self.config();
        let grpc = config.grpc.as_ref().ok_or(ConfigError::MissingSection("grpc"))?;
        Ok(GrpcMiddlewareLayer::new(&grpc.effective_middlewares())?)
    }

    /// Builds a queue consumer from the `queue` section.
    pub fn queue_server<T, Q, C, H>(&self, queue: Q, codec: C, handler: H) -> anyhow::Result<QueueServer<T>>
    where
        T: Send + 'static,
        Q: Queue,
        C: Codec<T>,
        H: QueueHandler<T>,
    {
        let config = self.config();
        let section = config.queue.as_ref().ok_or(ConfigError::MissingSection("queue"))?;
        Ok(QueueServer::new(section, queue, codec, handler)?)
    }

    /// Adds a server to run.
    pub fn add_server(&self, server: Arc<dyn Server>) -> anyhow::Result<()> {
        self.servers.add(server)?;
        Ok(())
    }

    /// Runs every server until SIGINT or SIGTERM stops them.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = SignalListener::spawn(self.registry.clone());
        self.serve(listener).await
    }

    /// Runs every server until `trigger` completes.
    pub async fn run_until<F>(self, trigger: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = SignalListener::spawn_with(self.registry.clone(), trigger);
        self.serve(listener).await
    }

    async fn serve(self, listener: SignalListener) -> anyhow::Result<()> {
        tracing::info!(servers = ?self.servers.names(), "application starting");
        self.servers.start().await?;
        drop(listener);
        tracing::info!("application stopped");
        Ok(())
    }
}
