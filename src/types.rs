// src/types.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of a single filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::Removed => "REMOVED",
        };
        f.write_str(name)
    }
}

/// One change observed under a watched root.
///
/// `path` is absolute (it is built from the canonicalized root the
/// watcher was registered with).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Added)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Removed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FileChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Which observation strategy a watcher should use.
///
/// - `Native`: block on the operating system's change notification queue.
/// - `Polling`: rescan every registered root at a fixed interval.
/// - `Auto`: native when the platform has a real notification backend,
///   polling otherwise (default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    #[default]
    Auto,
    Native,
    Polling,
}

impl FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(WatchMode::Auto),
            "native" => Ok(WatchMode::Native),
            "polling" | "poll" => Ok(WatchMode::Polling),
            other => Err(format!(
                "invalid watch mode: {other} (expected \"auto\", \"native\" or \"polling\")"
            )),
        }
    }
}
