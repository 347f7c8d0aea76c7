// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, WatcherConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(?path, "loading watcher config");
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Deserialize a configuration from TOML text.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks the interval, the loop name and every exclude glob.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WatcherConfig> {
    let raw_config = load_from_path(&path)?;
    WatcherConfig::try_from(raw_config)
}

/// `Treewatch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Treewatch.toml")
}
