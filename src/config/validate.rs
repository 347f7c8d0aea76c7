// src/config/validate.rs

use globset::Glob;

use crate::config::model::{RawConfigFile, WatcherConfig};
use crate::errors::{Result, WatchError};

impl TryFrom<RawConfigFile> for WatcherConfig {
    type Error = WatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(WatcherConfig::new_unchecked(raw.watcher, raw.filter))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watcher_section(cfg)?;
    validate_exclude_patterns(cfg)?;
    Ok(())
}

fn validate_watcher_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watcher.poll_interval_ms == 0 {
        return Err(WatchError::ConfigError(
            "[watcher].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.watcher.name.trim().is_empty() {
        return Err(WatchError::ConfigError(
            "[watcher].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_exclude_patterns(cfg: &RawConfigFile) -> Result<()> {
    for pattern in &cfg.filter.exclude {
        if let Err(err) = Glob::new(pattern) {
            return Err(WatchError::ConfigError(format!(
                "invalid exclude pattern '{}': {}",
                pattern, err
            )));
        }
    }
    Ok(())
}
