// src/watch/native/backend.rs

//! Per-directory native watch handles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// The operations the native watcher needs from an OS notification
/// backend: start and stop watching one directory (non-recursively).
///
/// Implemented for notify's [`RecommendedWatcher`]; tests can supply
/// their own to observe handle bookkeeping.
pub trait DirWatchBackend: Send {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl DirWatchBackend for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }

    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.unwatch(dir)
    }
}

/// Reference-counted native handles, one per directory.
///
/// Overlapping roots share a directory's handle; it is cancelled when the
/// last holder releases it. Dropping the backend (on close) tears down the
/// native queue.
pub(crate) struct DirHandles {
    backend: Option<Box<dyn DirWatchBackend>>,
    counts: HashMap<PathBuf, usize>,
}

impl DirHandles {
    pub(crate) fn new(backend: Box<dyn DirWatchBackend>) -> Self {
        Self {
            backend: Some(backend),
            counts: HashMap::new(),
        }
    }

    /// Take a reference on `dir`'s handle, registering it with the backend
    /// if it is the first. Returns false if no handle could be obtained.
    pub(crate) fn acquire(&mut self, dir: &Path) -> bool {
        if let Some(count) = self.counts.get_mut(dir) {
            *count += 1;
            return true;
        }
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        match backend.watch_dir(dir) {
            Ok(()) => {
                debug!(?dir, "native handle registered");
                self.counts.insert(dir.to_path_buf(), 1);
                true
            }
            Err(err) => {
                warn!(?dir, error = %err, "failed to register native handle");
                false
            }
        }
    }

    /// Drop a reference on `dir`'s handle, cancelling it with the backend
    /// when it was the last.
    pub(crate) fn release(&mut self, dir: &Path) {
        let Some(count) = self.counts.get_mut(dir) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        self.counts.remove(dir);
        if let Some(backend) = self.backend.as_mut() {
            // A handle for a deleted directory is already gone on the OS
            // side, so failure here is expected and harmless.
            if let Err(err) = backend.unwatch_dir(dir) {
                debug!(?dir, error = %err, "native handle already invalid");
            } else {
                debug!(?dir, "native handle cancelled");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self, dir: &Path) -> bool {
        self.counts.contains_key(dir)
    }

    pub(crate) fn active_count(&self) -> usize {
        self.counts.len()
    }

    /// Forget every handle and drop the backend, closing the native queue.
    pub(crate) fn shutdown(&mut self) {
        self.counts.clear();
        self.backend = None;
    }
}
