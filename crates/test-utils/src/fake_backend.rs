use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{CreateKind, DataChange, Flag, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use tokio::sync::mpsc;
use treewatch::watch::native::{RawEventReceiver, RawEventSender};
use treewatch::watch::DirWatchBackend;

/// A fake native backend that:
/// - records which directories currently hold a handle
/// - keeps a log of every watch / unwatch call
/// - never produces events itself (use an [`EventInjector`]).
#[derive(Clone, Default)]
pub struct FakeDirBackend {
    watched: Arc<Mutex<BTreeSet<PathBuf>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeDirBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched(&self) -> BTreeSet<PathBuf> {
        self.watched.lock().unwrap().clone()
    }

    pub fn is_watching(&self, dir: impl AsRef<Path>) -> bool {
        self.watched.lock().unwrap().contains(dir.as_ref())
    }

    /// `"watch <dir>"` / `"unwatch <dir>"` in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl DirWatchBackend for FakeDirBackend {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.calls.lock().unwrap().push(format!("watch {}", dir.display()));
        self.watched.lock().unwrap().insert(dir.to_path_buf());
        Ok(())
    }

    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.calls.lock().unwrap().push(format!("unwatch {}", dir.display()));
        if self.watched.lock().unwrap().remove(dir) {
            Ok(())
        } else {
            Err(notify::Error::watch_not_found().add_path(dir.to_path_buf()))
        }
    }
}

/// Pushes synthetic notify events into a native watcher's queue.
#[derive(Clone)]
pub struct EventInjector {
    tx: RawEventSender,
}

impl EventInjector {
    pub fn send(&self, kind: EventKind, paths: &[&Path]) {
        let event = paths
            .iter()
            .fold(Event::new(kind), |ev, p| ev.add_path(p.to_path_buf()));
        self.push(Ok(event));
    }

    fn push(&self, raw: notify::Result<Event>) {
        // The loop drops its receiver once the watcher is closed.
        if self.tx.send(raw).is_err() {
            tracing::debug!("injected event discarded; native watcher loop has exited");
        }
    }

    pub fn created_file(&self, path: impl AsRef<Path>) {
        self.send(EventKind::Create(CreateKind::File), &[path.as_ref()]);
    }

    pub fn created_dir(&self, path: impl AsRef<Path>) {
        self.send(EventKind::Create(CreateKind::Folder), &[path.as_ref()]);
    }

    pub fn modified(&self, path: impl AsRef<Path>) {
        self.send(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[path.as_ref()],
        );
    }

    pub fn removed(&self, path: impl AsRef<Path>) {
        self.send(EventKind::Remove(RemoveKind::Any), &[path.as_ref()]);
    }

    pub fn renamed(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) {
        self.send(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[from.as_ref(), to.as_ref()],
        );
    }

    /// Report a queue-level error.
    pub fn error(&self, message: &str) {
        self.push(Err(notify::Error::generic(message)));
    }

    /// Report a kernel queue overflow the way notify does: an unclassified
    /// event carrying the rescan flag and no paths.
    pub fn overflow(&self) {
        self.push(Ok(Event::new(EventKind::Other).set_flag(Flag::Rescan)));
    }
}

/// A fake backend plus the two ends of a raw event channel, ready for
/// `NativeWatcher::from_parts`.
pub fn fake_native_parts() -> (FakeDirBackend, EventInjector, RawEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FakeDirBackend::new(), EventInjector { tx }, rx)
}
