// src/snapshot/scan.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

use crate::fs::{EntryMetadata, FileSystem};

/// What a snapshot remembers about one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStamp {
    pub modified: SystemTime,
    pub is_dir: bool,
}

impl From<EntryMetadata> for PathStamp {
    fn from(meta: EntryMetadata) -> Self {
        Self {
            modified: meta.modified,
            is_dir: meta.is_dir,
        }
    }
}

/// Mapping from absolute path to its last observed [`PathStamp`].
///
/// A snapshot is never edited after a scan produced it; watchers replace
/// the whole value when a newer scan differs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: HashMap<PathBuf, PathStamp>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, stamp: PathStamp) {
        self.entries.insert(path.into(), stamp);
    }

    pub fn get(&self, path: &Path) -> Option<&PathStamp> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &PathStamp)> {
        self.entries.iter()
    }

    /// All recorded directories (the root included, if it is one).
    pub fn directories(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|(_, stamp)| stamp.is_dir)
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl FromIterator<(PathBuf, PathStamp)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (PathBuf, PathStamp)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Record every entry under `root`, `root` included.
///
/// Returns an empty snapshot when `root` does not exist.
pub fn scan(fs: &dyn FileSystem, root: &Path) -> Snapshot {
    scan_where(fs, root, |_| true)
}

/// Like [`scan`], but children for which `include` returns false are
/// neither recorded nor descended into. `root` itself is always visited.
///
/// The walk uses an explicit stack, so tree depth is bounded by memory
/// rather than by the call stack. Entries that vanish or cannot be read
/// while the walk is in progress are skipped.
pub fn scan_where<F>(fs: &dyn FileSystem, root: &Path, include: F) -> Snapshot
where
    F: Fn(&Path) -> bool,
{
    let mut snapshot = Snapshot::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        let meta = match fs.metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                trace!(?path, error = %err, "entry vanished during scan; skipping");
                continue;
            }
        };

        if meta.is_dir {
            match fs.read_dir(&path) {
                Ok(children) => pending.extend(children.into_iter().filter(|c| include(c.as_path()))),
                Err(err) => {
                    trace!(?path, error = %err, "directory unreadable during scan");
                }
            }
        }

        snapshot.insert(path, PathStamp::from(meta));
    }

    snapshot
}
