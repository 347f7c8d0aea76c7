// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::trace;

pub mod mock;

/// The two facts a snapshot records about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Abstract filesystem interface.
///
/// Watchers take an `Arc<dyn FileSystem>` so tests can swap in
/// [`mock::MockFileSystem`] and control timestamps exactly.
pub trait FileSystem: Send + Sync + Debug {
    fn metadata(&self, path: &Path) -> Result<EntryMetadata>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    fn exists(&self, path: &Path) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_dir).unwrap_or(false)
    }
}

/// Implementation that uses `std::fs`.
///
/// Symbolic links are stat'ed without being followed, so a link to a
/// directory is recorded as a plain entry and never descended into.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> Result<EntryMetadata> {
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("reading metadata for {:?}", path))?;
        let modified = meta
            .modified()
            .with_context(|| format!("reading mtime for {:?}", path))?;
        Ok(EntryMetadata {
            modified,
            is_dir: meta.is_dir(),
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))?;
        Ok(readable_entries(path, entries.map(|entry| entry.map(|e| e.path()))))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }
}

/// Keep the entries that could be read; one failing entry must not hide
/// its siblings.
fn readable_entries(dir: &Path, entries: impl Iterator<Item = std::io::Result<PathBuf>>) -> Vec<PathBuf> {
    entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                trace!(?dir, error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .collect()
}
