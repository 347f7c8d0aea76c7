// src/watch/polling.rs

//! Watcher that periodically rescans every registered root.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::WatcherConfig;
use crate::errors::{Result, WatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::snapshot::{diff, scan_where, Snapshot};
use crate::watch::callback::{dispatch, SharedCallback};
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::root_key;
use crate::watch::registry::{lock_state, Registered, Registry, Unregistered};
use crate::watch::worker::{ShutdownSignal, WorkerControl};
use crate::watch::FileSystemWatcher;

/// State shared between callers and the polling loop.
struct PollingShared {
    fs: Arc<dyn FileSystem>,
    filter: PathFilter,
    registry: Mutex<Registry<Snapshot>>,
}

impl PollingShared {
    fn scan_root(&self, root: &Path) -> Snapshot {
        scan_where(self.fs.as_ref(), root, |path| !self.filter.is_excluded(root, path))
    }

    /// One pass over every registered root.
    ///
    /// Scans run without the registry lock. The diff is committed only if
    /// the registration that was scanned is still the current one, so a
    /// root that was unwatched and re-watched meanwhile keeps its fresh
    /// baseline.
    fn poll_once(&self) {
        let roots = lock_state(&self.registry, "polling registry").roots();

        for (root, generation) in roots {
            let current = self.scan_root(&root);

            let delivery = {
                let mut registry = lock_state(&self.registry, "polling registry");
                match registry.get_mut(&root) {
                    Some(reg) if reg.generation() == generation => {
                        let events = diff(reg.state(), &current);
                        if events.is_empty() {
                            None
                        } else {
                            reg.replace_state(current);
                            Some((reg.callbacks().to_vec(), events))
                        }
                    }
                    _ => {
                        debug!(?root, "registration changed during scan; dropping result");
                        None
                    }
                }
            };

            if let Some((callbacks, events)) = delivery {
                dispatch(&root, &callbacks, &events);
            }
        }
    }
}

async fn run_polling_loop(shared: Arc<PollingShared>, interval: Duration, mut shutdown: ShutdownSignal) {
    info!(?interval, "polling watcher started");

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if shutdown.is_set() {
            break;
        }

        let cycle = Arc::clone(&shared);
        if let Err(err) = tokio::task::spawn_blocking(move || cycle.poll_once()).await {
            error!(error = %err, "polling cycle aborted");
        }
    }

    info!("polling watcher stopped");
}

/// Rescans each registered root every `poll_interval` and reports the
/// difference against the previous scan.
///
/// Works on any platform and any filesystem, at the cost of latency and a
/// full walk per cycle.
pub struct PollingWatcher {
    shared: Arc<PollingShared>,
    control: WorkerControl,
}

impl fmt::Debug for PollingWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingWatcher")
            .field("filter", &self.shared.filter)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl PollingWatcher {
    /// Start a polling watcher over the real filesystem.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        Self::with_fs(config, Arc::new(RealFileSystem))
    }

    /// Start a polling watcher over `fs`. A zero `poll_interval` is
    /// rejected with [`WatchError::ConfigError`].
    pub fn with_fs(config: &WatcherConfig, fs: Arc<dyn FileSystem>) -> Result<Self> {
        if config.poll_interval.is_zero() {
            return Err(WatchError::ConfigError(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        let filter = PathFilter::new(&config.exclude)
            .map_err(|e| WatchError::ConfigError(format!("{e:#}")))?;
        let shared = Arc::new(PollingShared {
            fs,
            filter,
            registry: Mutex::new(Registry::new()),
        });

        let interval = config.poll_interval;
        let loop_shared = Arc::clone(&shared);
        let control = WorkerControl::spawn(&config.name, move |signal| {
            run_polling_loop(loop_shared, interval, signal)
        })?;

        Ok(Self { shared, control })
    }

    /// True until the background loop has exited after `close()`.
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Roots that currently have at least one callback.
    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let registry = lock_state(&self.shared.registry, "polling registry");
        registry.iter().map(|reg| reg.root().to_path_buf()).collect()
    }
}

impl FileSystemWatcher for PollingWatcher {
    fn watch_path(&self, root: &Path, callback: SharedCallback) -> Result<()> {
        let key = root_key(self.shared.fs.as_ref(), root);
        let mut registry = lock_state(&self.shared.registry, "polling registry");
        if self.control.is_stopped() {
            return Err(WatchError::Closed);
        }

        // Seeding happens under the lock so no poll cycle can observe the
        // root without its baseline.
        let outcome = registry.register(key.clone(), callback, |root| self.shared.scan_root(root));
        if outcome == Registered::NewRoot {
            info!(root = ?key, "polling root registered");
        }
        Ok(())
    }

    fn unwatch_path(&self, root: &Path, callback: &SharedCallback) {
        let canonical = root_key(self.shared.fs.as_ref(), root);
        let mut registry = lock_state(&self.shared.registry, "polling registry");
        let key = registry.resolve(&canonical, root);

        match registry.unregister(&key, callback) {
            Unregistered::RootReleased(_) => info!(root = ?key, "polling root released"),
            Unregistered::CallbackRemoved => {}
            Unregistered::UnknownRoot | Unregistered::UnknownCallback => {
                debug!(root = ?key, "unwatch for unregistered callback ignored");
            }
        }
    }

    fn close(&self) {
        if !self.control.stop() {
            return;
        }
        let released = lock_state(&self.shared.registry, "polling registry").drain();
        info!(roots = released.len(), "polling watcher closed");
    }

    fn is_closed(&self) -> bool {
        self.control.is_stopped()
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
