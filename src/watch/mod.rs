// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - The [`FileSystemWatcher`] capability shared by both strategies.
//! - A polling watcher that rescans roots on a fixed interval.
//! - A native watcher built on `notify`, with per-directory handles and
//!   batch deduplication.
//! - Choosing between the two for the current platform.
//!
//! It knows nothing about what callers do with the changes; it only turns
//! filesystem activity into batches of [`FileChangeEvent`]s per root.
//!
//! [`FileChangeEvent`]: crate::types::FileChangeEvent

pub mod callback;
pub mod filter;
pub mod native;
pub mod path_utils;
pub mod polling;
pub mod registry;
mod worker;

use std::path::Path;

use notify::{RecommendedWatcher, WatcherKind};
use tracing::{info, warn};

use crate::config::WatcherConfig;
use crate::errors::Result;
use crate::types::WatchMode;

pub use callback::{dispatch, CallbackSet, FileChangeCallback, SharedCallback};
pub use filter::PathFilter;
pub use native::{dedup_batch, translate_event, DirWatchBackend, NativeWatcher};
pub use polling::PollingWatcher;
pub use registry::{Registered, Registration, Registry, Unregistered};

/// What both watcher strategies offer their callers.
///
/// All methods may be called from any thread. Callbacks are invoked only
/// from the watcher's own background loop.
pub trait FileSystemWatcher: Send + Sync {
    /// Start reporting changes under `root` to `callback`.
    ///
    /// The first interest in a root establishes its baseline; later
    /// callbacks join the existing registration. Registering the same
    /// callback twice for one root has no further effect. Fails with
    /// [`WatchError::Closed`](crate::errors::WatchError::Closed) once the
    /// watcher has been closed.
    fn watch_path(&self, root: &Path, callback: SharedCallback) -> Result<()>;

    /// Stop reporting to `callback`. The root itself stops being observed
    /// when its last callback leaves. Unknown pairs are ignored.
    fn unwatch_path(&self, root: &Path, callback: &SharedCallback);

    /// Stop the background loop and release every registration.
    /// Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Whether this platform has a real notification backend (rather than
/// notify falling back to polling itself).
pub fn native_supported() -> bool {
    !matches!(
        <RecommendedWatcher as notify::Watcher>::kind(),
        WatcherKind::PollWatcher | WatcherKind::NullWatcher
    )
}

/// Build the watcher `config` asks for.
///
/// `Auto` prefers the native watcher where the platform supports one and
/// falls back to polling if the native queue cannot be created.
pub fn create_watcher(config: &WatcherConfig) -> Result<Box<dyn FileSystemWatcher>> {
    match config.mode {
        WatchMode::Polling => Ok(Box::new(PollingWatcher::new(config)?)),
        WatchMode::Native => Ok(Box::new(NativeWatcher::new(config)?)),
        WatchMode::Auto => {
            if !native_supported() {
                info!("no native notification backend; using polling watcher");
                return Ok(Box::new(PollingWatcher::new(config)?));
            }
            match NativeWatcher::new(config) {
                Ok(watcher) => Ok(Box::new(watcher)),
                Err(err) => {
                    warn!(error = %err, "native watcher unavailable; falling back to polling");
                    Ok(Box::new(PollingWatcher::new(config)?))
                }
            }
        }
    }
}
