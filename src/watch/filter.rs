// src/watch/filter.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::watch::path_utils::relative_str;

/// Compiled exclude patterns shared by both watcher variants.
///
/// Patterns are matched against the path relative to the watched root,
/// with forward slashes (e.g. `"target/debug/app"`). The root itself is
/// never excluded.
#[derive(Clone, Default)]
pub struct PathFilter {
    patterns: Vec<String>,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFilter")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl PathFilter {
    /// Compile `patterns`; an empty list excludes nothing.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let exclude_set = if patterns.is_empty() {
            None
        } else {
            Some(build_globset(patterns).context("building exclude globset")?)
        };
        Ok(Self {
            patterns: patterns.to_vec(),
            exclude_set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if `path`, seen from `root`, matches an exclude pattern.
    ///
    /// Paths that cannot be related to `root` are not excluded.
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let Some(exclude) = &self.exclude_set else {
            return false;
        };
        match relative_str(root, path) {
            Some(rel) if !rel.is_empty() => exclude.is_match(&rel),
            _ => false,
        }
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> PathFilter {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        PathFilter::new(&owned).unwrap()
    }

    #[test]
    fn empty_filter_excludes_nothing() {
        let f = PathFilter::default();
        assert!(!f.is_excluded(Path::new("/p"), Path::new("/p/target")));
    }

    #[test]
    fn matches_relative_to_root() {
        let f = filter(&["target", "target/**", "**/*.swp"]);
        let root = Path::new("/p");

        assert!(f.is_excluded(root, Path::new("/p/target")));
        assert!(f.is_excluded(root, Path::new("/p/target/debug/app")));
        assert!(f.is_excluded(root, Path::new("/p/src/.main.rs.swp")));
        assert!(!f.is_excluded(root, Path::new("/p/src/main.rs")));
    }

    #[test]
    fn root_is_never_excluded() {
        let f = filter(&["**"]);
        assert!(!f.is_excluded(Path::new("/p"), Path::new("/p")));
        assert!(f.is_excluded(Path::new("/p"), Path::new("/p/anything")));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = PathFilter::new(&["src/[".to_string()]).unwrap_err();
        assert!(format!("{err:#}").contains("invalid glob pattern"));
    }
}
