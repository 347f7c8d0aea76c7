// src/fs/mock.rs

use super::{EntryMetadata, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File,
    Dir(Vec<String>), // List of child names
}

#[derive(Debug, Clone)]
struct MockNode {
    entry: MockEntry,
    modified: SystemTime,
}

#[derive(Debug, Default)]
struct MockTree {
    nodes: HashMap<PathBuf, MockNode>,
    /// Logical clock, advanced by every mutation.
    clock: u64,
}

impl MockTree {
    fn tick(&mut self) -> SystemTime {
        self.clock += 1;
        UNIX_EPOCH + Duration::from_secs(self.clock)
    }

    fn ensure_dir(&mut self, path: &Path, now: SystemTime) {
        if self.nodes.contains_key(path) {
            return;
        }
        self.nodes.insert(
            path.to_path_buf(),
            MockNode {
                entry: MockEntry::Dir(Vec::new()),
                modified: now,
            },
        );
        self.link_to_parent(path, now);
    }

    fn link_to_parent(&mut self, path: &Path, now: SystemTime) {
        let Some(parent) = path.parent() else {
            return;
        };
        if parent == path || parent.as_os_str().is_empty() {
            return;
        }
        self.ensure_dir(parent, now);
        if let Some(node) = self.nodes.get_mut(parent) {
            if let MockEntry::Dir(children) = &mut node.entry {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if !children.iter().any(|c| c == name) {
                        children.push(name.to_string());
                        node.modified = now;
                    }
                }
            }
        }
    }

    fn unlink_from_parent(&mut self, path: &Path, now: SystemTime) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
        else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(parent) {
            if let MockEntry::Dir(children) = &mut node.entry {
                let before = children.len();
                children.retain(|c| c != name);
                if children.len() != before {
                    node.modified = now;
                }
            }
        }
    }
}

/// In-memory filesystem with a logical clock.
///
/// Every mutation stamps the touched entry with a strictly increasing
/// modification time, and adding or removing a child restamps the parent
/// directory, like a real filesystem does.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    tree: Arc<Mutex<MockTree>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, MockTree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create (or re-stamp) a file, creating missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut guard = self.tree();
        let tree = &mut *guard;
        let now = tree.tick();
        if let Some(node) = tree.nodes.get_mut(path) {
            node.entry = MockEntry::File;
            node.modified = now;
            return;
        }
        tree.nodes.insert(
            path.to_path_buf(),
            MockNode {
                entry: MockEntry::File,
                modified: now,
            },
        );
        tree.link_to_parent(path, now);
    }

    /// Create a directory and any missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut tree = self.tree();
        let now = tree.tick();
        tree.ensure_dir(path.as_ref(), now);
    }

    /// Advance the modification time of an existing entry.
    ///
    /// Returns false if the entry does not exist.
    pub fn touch(&self, path: impl AsRef<Path>) -> bool {
        let mut tree = self.tree();
        let now = tree.tick();
        match tree.nodes.get_mut(path.as_ref()) {
            Some(node) => {
                node.modified = now;
                true
            }
            None => false,
        }
    }

    /// Remove an entry and, for directories, everything beneath it.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut tree = self.tree();
        if !tree.nodes.contains_key(path) {
            return false;
        }
        let now = tree.tick();
        tree.nodes.retain(|p, _| !p.starts_with(path));
        tree.unlink_from_parent(path, now);
        true
    }

    /// Current value of the logical clock.
    pub fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.tree().clock)
    }
}

impl FileSystem for MockFileSystem {
    fn metadata(&self, path: &Path) -> Result<EntryMetadata> {
        let tree = self.tree();
        match tree.nodes.get(path) {
            Some(node) => Ok(EntryMetadata {
                modified: node.modified,
                is_dir: matches!(node.entry, MockEntry::Dir(_)),
            }),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let tree = self.tree();
        match tree.nodes.get(path).map(|n| &n.entry) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }
}
