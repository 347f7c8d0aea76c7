// src/watch/native/events.rs

//! Raw notification translation and per-batch deduplication.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use tracing::trace;

use crate::types::{ChangeKind, FileChangeEvent};

/// Map one raw notify event onto ADDED / MODIFIED / REMOVED.
///
/// `exists` is consulted only for renames whose direction the backend did
/// not report: the side that still exists is ADDED, the other REMOVED.
/// Access and unclassified notifications produce nothing.
pub fn translate_event<F>(event: &Event, exists: F) -> Vec<FileChangeEvent>
where
    F: Fn(&Path) -> bool,
{
    let all = |kind: ChangeKind| -> Vec<FileChangeEvent> {
        event
            .paths
            .iter()
            .map(|p| FileChangeEvent::new(p.clone(), kind))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(ChangeKind::Added),
        EventKind::Remove(_) => all(ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(ChangeKind::Removed),
            RenameMode::To => all(ChangeKind::Added),
            RenameMode::Both if event.paths.len() == 2 => vec![
                FileChangeEvent::removed(event.paths[0].clone()),
                FileChangeEvent::added(event.paths[1].clone()),
            ],
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if exists(p) {
                        ChangeKind::Added
                    } else {
                        ChangeKind::Removed
                    };
                    FileChangeEvent::new(p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => all(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {
            trace!(kind = ?event.kind, paths = ?event.paths, "ignoring unclassified native event");
            Vec::new()
        }
    }
}

/// Collapse contradictory and redundant events within one batch.
///
/// For each path, looking at which kinds occur anywhere in the batch:
/// - ADDED + REMOVED + MODIFIED: only MODIFIED survives (the file was
///   replaced, e.g. written to a temp file and renamed over).
/// - MODIFIED with exactly one of ADDED / REMOVED: MODIFIED is dropped;
///   the add or remove already describes the transition.
/// - ADDED + REMOVED without MODIFIED: both are dropped.
///
/// Exact repeats of a (path, kind) pair are delivered once. Surviving
/// events keep their original relative order.
pub fn dedup_batch(events: Vec<FileChangeEvent>) -> Vec<FileChangeEvent> {
    let added: HashSet<PathBuf> = paths_of(&events, ChangeKind::Added);
    let removed: HashSet<PathBuf> = paths_of(&events, ChangeKind::Removed);

    let mut seen: HashSet<(PathBuf, ChangeKind)> = HashSet::new();
    events
        .into_iter()
        .filter(|event| {
            let path = event.path.as_path();
            match event.kind {
                ChangeKind::Modified => {
                    let was_added = added.contains(path);
                    let was_removed = removed.contains(path);
                    (was_added && was_removed) || (!was_added && !was_removed)
                }
                ChangeKind::Added => !removed.contains(path),
                ChangeKind::Removed => !added.contains(path),
            }
        })
        .filter(|event| seen.insert((event.path.clone(), event.kind)))
        .collect()
}

fn paths_of(events: &[FileChangeEvent], kind: ChangeKind) -> HashSet<PathBuf> {
    events
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.path.clone())
        .collect()
}
