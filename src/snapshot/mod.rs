// src/snapshot/mod.rs

//! Point-in-time path state and change classification.
//!
//! - [`scan`] walks a directory tree and records, for every entry, its
//!   modification time and whether it is a directory.
//! - [`diff`] compares two snapshots and yields ADDED / MODIFIED / REMOVED
//!   events. It is pure and never touches the filesystem.

pub mod diff;
pub mod scan;

pub use diff::diff;
pub use scan::{scan, scan_where, PathStamp, Snapshot};
