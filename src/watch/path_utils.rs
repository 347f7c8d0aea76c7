// src/watch/path_utils.rs

//! Utility functions for path handling in the watchers.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fs::FileSystem;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
/// - Only if both attempts fail do we give up.
///
/// Returns `None` if the path cannot be reasonably related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    // Fast path: event path already starts with our root.
    if let Ok(rel) = path.strip_prefix(root) {
        let s = rel.to_string_lossy().replace('\\', "/");
        return Some(s);
    }

    // On macOS the same directory may surface as /var/... and
    // /private/var/...; canonicalizing both sides lines them up.
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            let s = rel.to_string_lossy().replace('\\', "/");
            return Some(s);
        }
    }

    None
}

/// The key a root is registered under.
///
/// Canonicalize once so that `./src`, `src/` and `/abs/src` all land on
/// the same registration. A root that cannot be canonicalized (usually
/// because it does not exist yet) is used as given.
pub fn root_key(fs: &dyn FileSystem, root: &Path) -> PathBuf {
    match fs.canonicalize(root) {
        Ok(canon) => canon,
        Err(err) => {
            debug!(?root, error = %err, "could not canonicalize root; using it as given");
            root.to_path_buf()
        }
    }
}
