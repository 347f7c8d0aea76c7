// src/config/mod.rs

//! Configuration loading and validation for treewatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn the raw file into a checked [`WatcherConfig`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{FilterSection, RawConfigFile, WatcherConfig, WatcherSection};
