// src/watch/native/mod.rs

//! Watcher driven by the operating system's change notifications.
//!
//! Every directory under a watched root gets its own non-recursive handle.
//! Directories created later are picked up from the creation events
//! themselves, and handles of deleted directories are pruned when their
//! removal is reported.

mod backend;
mod events;

pub use backend::DirWatchBackend;
pub use events::{dedup_batch, translate_event};

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::Flag;
use notify::{Event, RecommendedWatcher, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::WatcherConfig;
use crate::errors::{Result, WatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::snapshot::scan_where;
use crate::types::{ChangeKind, FileChangeEvent};
use crate::watch::callback::{dispatch, SharedCallback};
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::root_key;
use crate::watch::registry::{lock_state, Registered, Registry, Unregistered};
use crate::watch::worker::{ShutdownSignal, WorkerControl};
use crate::watch::FileSystemWatcher;

use backend::DirHandles;

/// Raw notifications as produced by a notify event handler.
pub type RawEvent = notify::Result<Event>;
pub type RawEventSender = mpsc::UnboundedSender<RawEvent>;
pub type RawEventReceiver = mpsc::UnboundedReceiver<RawEvent>;

struct NativeState {
    /// Per root: the directories it holds a handle reference on.
    registry: Registry<BTreeSet<PathBuf>>,
    handles: DirHandles,
}

struct NativeShared {
    fs: Arc<dyn FileSystem>,
    filter: PathFilter,
    state: Mutex<NativeState>,
}

impl NativeShared {
    /// Acquire handles for `start` and every directory below it that
    /// `root`'s filter admits, recording them in `tracked`.
    fn track_tree(&self, handles: &mut DirHandles, root: &Path, start: &Path, tracked: &mut BTreeSet<PathBuf>) {
        let found = scan_where(self.fs.as_ref(), start, |path| !self.filter.is_excluded(root, path));
        for dir in found.directories() {
            if tracked.contains(&dir) {
                continue;
            }
            if handles.acquire(&dir) {
                tracked.insert(dir);
            }
        }
    }

    /// Translate a raw batch. The flag is set when the backend reported
    /// that events were lost and the watched trees must be rescanned.
    fn translate(&self, raw: Vec<RawEvent>) -> (Vec<FileChangeEvent>, bool) {
        let mut events = Vec::new();
        let mut rescan = false;
        for item in raw {
            match item {
                Ok(event) if event.flag() == Some(Flag::Rescan) => {
                    warn!(paths = ?event.paths, "native event queue overflowed; rescanning watched roots");
                    rescan = true;
                }
                Ok(event) => {
                    trace!(?event, "raw native event");
                    events.extend(translate_event(&event, |path| self.fs.exists(path)));
                }
                Err(err) => {
                    warn!(error = %err, paths = ?err.paths, "native event queue reported an error");
                }
            }
        }
        (events, rescan)
    }

    /// Handle one drained batch of raw notifications.
    ///
    /// Directory bookkeeping happens under the state lock; callbacks run
    /// after it is released.
    fn process_batch(&self, raw: Vec<RawEvent>) {
        let (events, rescan) = self.translate(raw);
        if events.is_empty() && !rescan {
            return;
        }

        let deliveries = {
            let mut state = lock_state(&self.state, "native registry");
            let NativeState { registry, handles } = &mut *state;

            let mut deliveries = Vec::new();
            for reg in registry.iter_mut() {
                let root = reg.root().to_path_buf();
                if rescan {
                    self.resync_tree(handles, &root, reg.state_mut());
                }

                let relevant: Vec<FileChangeEvent> = events
                    .iter()
                    .filter(|e| e.path.starts_with(&root) && !self.filter.is_excluded(&root, &e.path))
                    .cloned()
                    .collect();
                if relevant.is_empty() {
                    continue;
                }

                for event in &relevant {
                    match event.kind {
                        ChangeKind::Added if self.fs.is_dir(&event.path) => {
                            debug!(dir = ?event.path, ?root, "tracking created directory");
                            self.track_tree(handles, &root, &event.path, reg.state_mut());
                        }
                        ChangeKind::Removed => prune_tree(handles, &event.path, reg.state_mut()),
                        _ => {}
                    }
                }

                let batch = dedup_batch(relevant);
                if !batch.is_empty() {
                    deliveries.push((root, reg.callbacks().to_vec(), batch));
                }
            }
            deliveries
        };

        for (root, callbacks, batch) in deliveries {
            dispatch(&root, &callbacks, &batch);
        }
    }

    /// Bring `tracked` back in line with the directories that exist under
    /// `root` after notifications were lost.
    fn resync_tree(&self, handles: &mut DirHandles, root: &Path, tracked: &mut BTreeSet<PathBuf>) {
        tracked.retain(|dir| {
            if self.fs.is_dir(dir) {
                true
            } else {
                debug!(?dir, "releasing handle of vanished directory");
                handles.release(dir);
                false
            }
        });
        self.track_tree(handles, root, root, tracked);
        debug!(?root, dirs = tracked.len(), "watched tree resynchronised");
    }
}

/// Release every tracked directory at or below `path`.
fn prune_tree(handles: &mut DirHandles, path: &Path, tracked: &mut BTreeSet<PathBuf>) {
    tracked.retain(|dir| {
        if dir.starts_with(path) {
            debug!(?dir, "pruning handle of removed directory");
            handles.release(dir);
            false
        } else {
            true
        }
    });
}

async fn run_native_loop(
    shared: Arc<NativeShared>,
    mut raw_rx: RawEventReceiver,
    batch_window: Duration,
    mut shutdown: ShutdownSignal,
) {
    info!(?batch_window, "native watcher started");

    loop {
        let first = tokio::select! {
            _ = shutdown.wait() => break,
            received = raw_rx.recv() => match received {
                Some(raw) => raw,
                None => {
                    debug!("native event queue closed");
                    break;
                }
            },
        };

        // Let the rest of a multi-step operation arrive so it is
        // deduplicated as one batch.
        if !batch_window.is_zero() {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(batch_window) => {}
            }
        }

        let mut batch = vec![first];
        while let Ok(raw) = raw_rx.try_recv() {
            batch.push(raw);
        }
        if shutdown.is_set() {
            break;
        }

        let cycle = Arc::clone(&shared);
        if let Err(err) = tokio::task::spawn_blocking(move || cycle.process_batch(batch)).await {
            error!(error = %err, "native batch processing aborted");
        }
    }

    info!("native watcher stopped");
}

/// Reports changes as the OS announces them, with per-directory handles and
/// batch deduplication.
pub struct NativeWatcher {
    shared: Arc<NativeShared>,
    control: WorkerControl,
}

impl fmt::Debug for NativeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeWatcher")
            .field("filter", &self.shared.filter)
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

impl NativeWatcher {
    /// Create the OS notification queue and start the event loop.
    ///
    /// Fails with [`WatchError::Notify`] if the queue cannot be created and
    /// with [`WatchError::NoRuntime`] outside a tokio runtime.
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let backend = RecommendedWatcher::new(forward_to(raw_tx), notify::Config::default())?;
        Self::from_parts(config, Arc::new(RealFileSystem), Box::new(backend), raw_rx)
    }

    /// Assemble a watcher from an explicit backend and the receiving end of
    /// the channel its notifications arrive on.
    pub fn from_parts(
        config: &WatcherConfig,
        fs: Arc<dyn FileSystem>,
        backend: Box<dyn DirWatchBackend>,
        raw_rx: RawEventReceiver,
    ) -> Result<Self> {
        let filter = PathFilter::new(&config.exclude)
            .map_err(|e| WatchError::ConfigError(format!("{e:#}")))?;
        let shared = Arc::new(NativeShared {
            fs,
            filter,
            state: Mutex::new(NativeState {
                registry: Registry::new(),
                handles: DirHandles::new(backend),
            }),
        });

        let batch_window = config.batch_window;
        let loop_shared = Arc::clone(&shared);
        let control = WorkerControl::spawn(&config.name, move |signal| {
            run_native_loop(loop_shared, raw_rx, batch_window, signal)
        })?;

        Ok(Self { shared, control })
    }

    /// True until the background loop has exited after `close()`.
    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    pub fn watched_roots(&self) -> Vec<PathBuf> {
        let state = lock_state(&self.shared.state, "native registry");
        state.registry.iter().map(|reg| reg.root().to_path_buf()).collect()
    }

    /// Directories holding a handle on behalf of `root`, sorted.
    pub fn watched_dirs(&self, root: &Path) -> Vec<PathBuf> {
        let canonical = root_key(self.shared.fs.as_ref(), root);
        let state = lock_state(&self.shared.state, "native registry");
        let key = state.registry.resolve(&canonical, root);
        state
            .registry
            .get(&key)
            .map(|reg| reg.state().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct directories with a live native handle.
    pub fn active_handles(&self) -> usize {
        lock_state(&self.shared.state, "native registry").handles.active_count()
    }
}

/// Event handler that pushes notify's output into the loop's channel.
fn forward_to(raw_tx: RawEventSender) -> impl FnMut(RawEvent) + Send + 'static {
    move |raw| {
        if raw_tx.send(raw).is_err() {
            trace!("native event dropped; watcher loop has exited");
        }
    }
}

impl FileSystemWatcher for NativeWatcher {
    fn watch_path(&self, root: &Path, callback: SharedCallback) -> Result<()> {
        let key = root_key(self.shared.fs.as_ref(), root);
        let mut state = lock_state(&self.shared.state, "native registry");
        if self.control.is_stopped() {
            return Err(WatchError::Closed);
        }

        let NativeState { registry, handles } = &mut *state;
        let shared = &self.shared;
        let outcome = registry.register(key.clone(), callback, |root| {
            let mut tracked = BTreeSet::new();
            shared.track_tree(handles, root, root, &mut tracked);
            tracked
        });
        if outcome == Registered::NewRoot {
            let dirs = registry.get(&key).map_or(0, |reg| reg.state().len());
            info!(root = ?key, dirs, "native root registered");
        }
        Ok(())
    }

    fn unwatch_path(&self, root: &Path, callback: &SharedCallback) {
        let canonical = root_key(self.shared.fs.as_ref(), root);
        let mut state = lock_state(&self.shared.state, "native registry");
        let NativeState { registry, handles } = &mut *state;
        let key = registry.resolve(&canonical, root);

        match registry.unregister(&key, callback) {
            Unregistered::RootReleased(dirs) => {
                for dir in &dirs {
                    handles.release(dir);
                }
                info!(root = ?key, dirs = dirs.len(), "native root released");
            }
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
        let mut state = lock_state(&self.shared.state, "native registry");
        let released = state.registry.drain();
        state.handles.shutdown();
        info!(roots = released.len(), "native watcher closed");
    }

    fn is_closed(&self) -> bool {
        self.control.is_stopped()
    }
}

impl Drop for NativeWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use notify::EventKind;

    #[derive(Clone, Default)]
    struct Watched(Arc<Mutex<BTreeSet<PathBuf>>>);

    impl DirWatchBackend for Watched {
        fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
            self.0.lock().unwrap().insert(dir.to_path_buf());
            Ok(())
        }

        fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()> {
            self.0.lock().unwrap().remove(dir);
            Ok(())
        }
    }

    fn shared_over(fs: &MockFileSystem, backend: Watched) -> NativeShared {
        NativeShared {
            fs: Arc::new(fs.clone()),
            filter: PathFilter::new(&["**/skip".to_string()]).unwrap(),
            state: Mutex::new(NativeState {
                registry: Registry::new(),
                handles: DirHandles::new(Box::new(backend)),
            }),
        }
    }

    fn register(shared: &NativeShared, root: &str) -> Arc<Mutex<Vec<Vec<FileChangeEvent>>>> {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let cb: SharedCallback = Arc::new(move |events: &[FileChangeEvent]| -> anyhow::Result<()> {
            sink.lock().unwrap().push(events.to_vec());
            Ok(())
        });

        let mut state = shared.state.lock().unwrap();
        let NativeState { registry, handles } = &mut *state;
        registry.register(PathBuf::from(root), cb, |root| {
            let mut tracked = BTreeSet::new();
            shared.track_tree(handles, root, root, &mut tracked);
            tracked
        });
        batches
    }

    fn raw(kind: EventKind, path: &str) -> RawEvent {
        Ok(Event::new(kind).add_path(PathBuf::from(path)))
    }

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn registration_tracks_every_admitted_directory() {
        let fs = MockFileSystem::new();
        fs.add_file("/r/a/x");
        fs.add_file("/r/skip/y");
        let backend = Watched::default();
        let shared = shared_over(&fs, backend.clone());

        register(&shared, "/r");
        assert_eq!(*backend.0.lock().unwrap(), set(&["/r", "/r/a"]));
    }

    #[test]
    fn created_directory_tree_is_tracked_and_removal_prunes_it() {
        let fs = MockFileSystem::new();
        fs.add_dir("/r");
        let backend = Watched::default();
        let shared = shared_over(&fs, backend.clone());
        let batches = register(&shared, "/r");

        fs.add_file("/r/new/deep/file");
        shared.process_batch(vec![raw(EventKind::Create(CreateKind::Folder), "/r/new")]);
        assert_eq!(*backend.0.lock().unwrap(), set(&["/r", "/r/new", "/r/new/deep"]));

        fs.remove("/r/new");
        shared.process_batch(vec![raw(EventKind::Remove(RemoveKind::Folder), "/r/new")]);
        assert_eq!(*backend.0.lock().unwrap(), set(&["/r"]));

        let batches = batches.lock().unwrap();
        assert_eq!(
            *batches,
            vec![
                vec![FileChangeEvent::added("/r/new")],
                vec![FileChangeEvent::removed("/r/new")],
            ]
        );
    }

    #[test]
    fn batch_is_deduplicated_and_scoped_to_the_root() {
        let fs = MockFileSystem::new();
        fs.add_dir("/r");
        fs.add_dir("/other");
        let shared = shared_over(&fs, Watched::default());
        let batches = register(&shared, "/r");

        fs.add_file("/r/x");
        shared.process_batch(vec![
            raw(EventKind::Create(CreateKind::File), "/r/x"),
            raw(EventKind::Modify(ModifyKind::Data(DataChange::Content)), "/r/x"),
            raw(EventKind::Remove(RemoveKind::File), "/r/x"),
            raw(EventKind::Create(CreateKind::File), "/other/y"),
            raw(EventKind::Create(CreateKind::File), "/r/skip"),
        ]);

        assert_eq!(*batches.lock().unwrap(), vec![vec![FileChangeEvent::modified("/r/x")]]);
    }

    #[test]
    fn cancelling_pair_invokes_nothing() {
        let fs = MockFileSystem::new();
        fs.add_dir("/r");
        let shared = shared_over(&fs, Watched::default());
        let batches = register(&shared, "/r");

        shared.process_batch(vec![
            raw(EventKind::Create(CreateKind::File), "/r/tmp"),
            raw(EventKind::Remove(RemoveKind::File), "/r/tmp"),
        ]);
        assert!(batches.lock().unwrap().is_empty());
    }

    #[test]
    fn overflow_rescan_tracks_missed_directories_and_drops_vanished_ones() {
        let fs = MockFileSystem::new();
        fs.add_dir("/r/old");
        let backend = Watched::default();
        let shared = shared_over(&fs, backend.clone());
        let batches = register(&shared, "/r");
        assert_eq!(*backend.0.lock().unwrap(), set(&["/r", "/r/old"]));

        fs.add_dir("/r/missed/inner");
        fs.remove("/r/old");
        shared.process_batch(vec![Ok(Event::new(EventKind::Other).set_flag(Flag::Rescan))]);

        assert_eq!(*backend.0.lock().unwrap(), set(&["/r", "/r/missed", "/r/missed/inner"]));
        assert_eq!(
            shared.state.lock().unwrap().registry.get(Path::new("/r")).unwrap().state().clone(),
            set(&["/r", "/r/missed", "/r/missed/inner"])
        );
        assert!(batches.lock().unwrap().is_empty());
    }

    #[test]
    fn unflagged_other_event_changes_nothing() {
        let fs = MockFileSystem::new();
        fs.add_dir("/r");
        let backend = Watched::default();
        let shared = shared_over(&fs, backend.clone());
        register(&shared, "/r");

        fs.add_dir("/r/late");
        shared.process_batch(vec![Ok(Event::new(EventKind::Other))]);
        assert_eq!(*backend.0.lock().unwrap(), set(&["/r"]));
    }

    #[tokio::test]
    async fn os_backed_watcher_starts_and_closes() {
        let watcher = NativeWatcher::new(&WatcherConfig::default()).unwrap();
        assert!(!watcher.is_closed());
        watcher.close();
        assert!(watcher.is_closed());
        assert_eq!(watcher.active_handles(), 0);
    }
}
