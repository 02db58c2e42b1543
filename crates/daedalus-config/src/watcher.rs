//! Live configuration reload.
//!
//! [`ConfigHolder`] owns the active [`Config`] behind an
//! `RwLock<Arc<Config>>`. A reload parses the file into a fresh value and
//! swaps the pointer, so readers either see the old config or the new one.
//! [`ConfigHolder::watch`] drives reloads from file system events using the
//! `notify` crate.
//!
//! # Example
//!
//! ```no_run
//! use daedalus_config::{ConfigHolder, WatchOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), daedalus_config::ConfigError> {
//! let holder = Arc::new(ConfigHolder::load("config.toml")?);
//! holder.on_change(|result| match result {
//!     Ok(config) => tracing::info!(http = ?config.http, "config reloaded"),
//!     Err(e) => tracing::warn!(error = %e, "config reload rejected"),
//! });
//!
//! // Reloads stop when the watcher is dropped.
//! let _watcher = holder.watch(WatchOptions::default())?;
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{ConfigError, ConfigResult};
use crate::loader::{ConfigLoader, ENV_PREFIX};

/// Receives the outcome of every reload.
pub type ChangeCallback = Arc<dyn Fn(Result<&Config, &ConfigError>) + Send + Sync>;

/// Default quiet period before a change is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// How the watcher detects changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Events arriving within this window after the first are coalesced.
    pub debounce: Duration,
    /// Poll the file at this interval instead of using native events.
    pub poll_interval: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: None,
        }
    }
}

impl WatchOptions {
    /// Polling options, for file systems without native change events.
    #[must_use]
    pub fn polling(interval: Duration) -> Self {
        Self {
            poll_interval: Some(interval),
            ..Self::default()
        }
    }
}

/// Shared, reloadable configuration.
pub struct ConfigHolder {
    current: RwLock<Arc<Config>>,
    source: Option<PathBuf>,
    callbacks: Mutex<Vec<ChangeCallback>>,
}

impl std::fmt::Debug for ConfigHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHolder")
            .field("source", &self.source)
            .field("callbacks", &self.callbacks.lock().len())
            .finish_non_exhaustive()
    }
}

impl ConfigHolder {
    /// Holds a fixed config with no backing file.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            source: None,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Loads `path` with [`load_config`](crate::load_config) and remembers it
    /// for reloads.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let config = crate::loader::load_config(&path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            source: Some(path),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    /// Returns the active config.
    #[must_use]
    pub fn get(&self) -> Arc<Config> {
        Arc::clone(&self.current.read())
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Registers a callback run after every reload attempt.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(Result<&Config, &ConfigError>) + Send + Sync + 'static,
    {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Replaces the active config and notifies callbacks.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let config = Arc::new(config);
        *self.current.write() = Arc::clone(&config);
        self.notify(Ok(&config));
        config
    }

    /// Re-reads the backing file.
    ///
    /// On failure the active config is kept and callbacks receive the error.
    pub fn reload(&self) -> ConfigResult<Arc<Config>> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| ConfigError::Watch("config holder has no backing file".to_string()))?;

        let loaded = ConfigLoader::new()
            .with_file(path)
            .map(|loader| loader.with_env_prefix(ENV_PREFIX))
            .and_then(ConfigLoader::load);

        match loaded {
            Ok(config) => Ok(self.replace(config)),
            Err(e) => {
                self.notify(Err(&e));
                Err(e)
            }
        }
    }

    fn notify(&self, result: Result<&Config, &ConfigError>) {
        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(result);
        }
    }

    /// Starts reloading on changes to the backing file.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// [`ConfigWatcher`] stops it.
    pub fn watch(self: &Arc<Self>, options: WatchOptions) -> ConfigResult<ConfigWatcher> {
        let path = self
            .source
            .clone()
            .ok_or_else(|| ConfigError::Watch("config holder has no backing file".to_string()))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConfigError::Watch(format!("no tokio runtime: {e}")))?;

        let file_name = path
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| ConfigError::Watch(format!("{} is not a file", path.display())))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::channel::<()>(16);
        let handler = change_handler(tx, file_name);
        let watcher = match options.poll_interval {
            Some(interval) => {
                let config = notify::Config::default()
                    .with_poll_interval(interval)
                    .with_compare_contents(true);
                ActiveWatcher::Poll(PollWatcher::new(handler, config).map_err(watch_error)?)
            }
            None => ActiveWatcher::Native(notify::recommended_watcher(handler).map_err(watch_error)?),
        }
        .watching(&dir)?;

        let holder = Arc::clone(self);
        let debounce = options.debounce;
        let task = runtime.spawn(async move {
            while rx.recv().await.is_some() {
                tokio::time::sleep(debounce).await;
                while rx.try_recv().is_ok() {}

                match holder.reload() {
                    Ok(_) => tracing::info!(path = %path.display(), "configuration reloaded"),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "configuration reload failed"),
                }
            }
        });

        tracing::debug!(dir = %dir.display(), "watching configuration");
        Ok(ConfigWatcher {
            _watcher: watcher,
            task,
        })
    }
}

fn watch_error(e: notify::Error) -> ConfigError {
    ConfigError::Watch(e.to_string())
}

fn change_handler(
    tx: mpsc::Sender<()>,
    file_name: OsString,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |result| match result {
        Ok(event) => {
            let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                && event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
            if relevant {
                // A full channel already has a reload pending.
                let _ = tx.try_send(());
            }
        }
        Err(e) => tracing::warn!(error = %e, "configuration watch error"),
    }
}

enum ActiveWatcher {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

impl ActiveWatcher {
    fn watching(mut self, dir: &Path) -> ConfigResult<Self> {
        let result = match &mut self {
            Self::Native(w) => w.watch(dir, RecursiveMode::NonRecursive),
            Self::Poll(w) => w.watch(dir, RecursiveMode::NonRecursive),
        };
        result.map_err(watch_error)?;
        Ok(self)
    }
}

/// A running config watcher. Dropping it stops reloads.
pub struct ConfigWatcher {
    _watcher: ActiveWatcher,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, addr: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, format!("[http]\naddr = \"{addr}\"\n")).unwrap();
        path
    }

    fn addr(config: &Config) -> String {
        config.http.as_ref().unwrap().server.addr.clone()
    }

    #[test]
    fn test_reload_swaps_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, ":8080");
        let holder = ConfigHolder::load(&path).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        holder.on_change(move |result| sink.lock().push(result.map(addr).map_err(ToString::to_string)));

        let before = holder.get();
        write_config(&dir, ":9090");
        holder.reload().unwrap();

        assert_eq!(addr(&before), ":8080");
        assert_eq!(addr(&holder.get()), ":9090");
        assert_eq!(*seen.lock(), vec![Ok(":9090".to_string())]);
    }

    #[test]
    fn test_failed_reload_keeps_active_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, ":8080");
        let holder = ConfigHolder::load(&path).unwrap();
        let errors = Arc::new(Mutex::new(0));

        let count = Arc::clone(&errors);
        holder.on_change(move |result| {
            if result.is_err() {
                *count.lock() += 1;
            }
        });

        fs::write(&path, "[http\naddr = ").unwrap();
        assert!(holder.reload().is_err());
        assert_eq!(addr(&holder.get()), ":8080");
        assert_eq!(*errors.lock(), 1);
    }

    #[test]
    fn test_holder_without_file() {
        let holder = ConfigHolder::new(Config::default());
        assert!(holder.path().is_none());
        assert!(matches!(holder.reload(), Err(ConfigError::Watch(_))));
    }

    #[tokio::test]
    async fn test_watch_reloads_on_write() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, ":8080");
        let holder = Arc::new(ConfigHolder::load(&path).unwrap());

        let (tx, mut rx) = mpsc::unbounded_channel();
        holder.on_change(move |result| {
            if let Ok(Some(http)) = result.map(|config| config.http.as_ref()) {
                let _ = tx.send(http.server.addr.clone());
            }
        });

        let options = WatchOptions {
            debounce: Duration::from_millis(20),
            poll_interval: Some(Duration::from_millis(25)),
        };
        let watcher = holder.watch(options).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        write_config(&dir, ":9090");

        let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(addr) if addr == ":9090" => return addr,
                    Some(_) => continue,
                    None => panic!("callback channel closed"),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(reloaded, ":9090");
        assert_eq!(addr(&holder.get()), ":9090");
        drop(watcher);
    }
}
