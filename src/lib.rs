// src/lib.rs

//! Observe directory trees and report file additions, modifications and
//! removals to registered callbacks.
//!
//! Two strategies sit behind the [`FileSystemWatcher`] capability: a
//! [`PollingWatcher`] that rescans each root on an interval, and a
//! [`NativeWatcher`] that follows the OS notification queue. Use
//! [`create_watcher`] to pick one from a [`WatcherConfig`].
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use treewatch::{create_watcher, FileChangeEvent, SharedCallback, WatcherConfig};
//!
//! # async fn demo() -> treewatch::errors::Result<()> {
//! let watcher = create_watcher(&WatcherConfig::default())?;
//! let callback: SharedCallback = Arc::new(|events: &[FileChangeEvent]| -> anyhow::Result<()> {
//!     for event in events {
//!         println!("{event}");
//!     }
//!     Ok(())
//! });
//! watcher.watch_path(Path::new("src"), callback.clone())?;
//! // ...
//! watcher.unwatch_path(Path::new("src"), &callback);
//! watcher.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod snapshot;
pub mod types;
pub mod watch;

pub use config::WatcherConfig;
pub use errors::{Result, WatchError};
pub use types::{ChangeKind, FileChangeEvent, WatchMode};
pub use watch::{
    create_watcher, native_supported, FileChangeCallback, FileSystemWatcher, NativeWatcher,
    PollingWatcher, SharedCallback,
};
