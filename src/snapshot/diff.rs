// src/snapshot/diff.rs

use crate::snapshot::Snapshot;
use crate::types::{ChangeKind, FileChangeEvent};

/// Compare two snapshots of the same root.
///
/// - present only in `current` -> ADDED
/// - present in both with a different mtime -> MODIFIED, unless the entry
///   is a directory in `current` (a directory's mtime moves whenever a
///   child is added or removed, and those children are reported on their
///   own)
/// - present only in `previous` -> REMOVED
///
/// Events are returned sorted by path, then kind. Callers must not rely
/// on any particular order.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<FileChangeEvent> {
    let mut events = Vec::new();

    for (path, stamp) in current.iter() {
        match previous.get(path) {
            None => events.push(FileChangeEvent::new(path.clone(), ChangeKind::Added)),
            Some(old) if old.modified != stamp.modified && !stamp.is_dir => {
                events.push(FileChangeEvent::new(path.clone(), ChangeKind::Modified));
            }
            Some(_) => {}
        }
    }

    for (path, _) in previous.iter() {
        if !current.contains(path) {
            events.push(FileChangeEvent::new(path.clone(), ChangeKind::Removed));
        }
    }

    events.sort_by(|a, b| a.path.cmp(&b.path).then(a.kind.cmp(&b.kind)));
    events
}
