// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::WatchMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watcher]
/// mode = "auto"
/// poll_interval_ms = 1000
/// batch_window_ms = 20
/// name = "treewatch"
///
/// [filter]
/// exclude = ["**/target/**"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,

    #[serde(default)]
    pub filter: FilterSection,
}

/// `[watcher]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSection {
    /// `"auto"` (default), `"native"` or `"polling"`.
    #[serde(default)]
    pub mode: WatchMode,

    /// Delay between two polling cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long the native loop waits after the first event of a batch
    /// before draining the rest. Zero disables the wait.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Name of the background loop's tracing span.
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_window_ms() -> u64 {
    20
}

fn default_name() -> String {
    "treewatch".to_string()
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_window_ms: default_batch_window_ms(),
            name: default_name(),
        }
    }
}

/// `[filter]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSection {
    /// Globs, relative to each watched root, for entries to ignore.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Validated watcher settings.
///
/// Obtain one from a file via [`load_and_validate`](crate::config::load_and_validate)
/// or build it directly from [`WatcherConfig::default`] and the `with_*`
/// setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub mode: WatchMode,
    pub poll_interval: Duration,
    pub batch_window: Duration,
    pub name: String,
    pub exclude: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::default(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            batch_window: Duration::from_millis(default_batch_window_ms()),
            name: default_name(),
            exclude: Vec::new(),
        }
    }
}

impl WatcherConfig {
    pub fn with_mode(mut self, mode: WatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_window(mut self, window: Duration) -> Self {
        self.batch_window = window;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Construct without validation. Used by the `TryFrom` impl once the
    /// raw file has been checked.
    pub(crate) fn new_unchecked(watcher: WatcherSection, filter: FilterSection) -> Self {
        Self {
            mode: watcher.mode,
            poll_interval: Duration::from_millis(watcher.poll_interval_ms),
            batch_window: Duration::from_millis(watcher.batch_window_ms),
            name: watcher.name,
            exclude: filter.exclude,
        }
    }
}
