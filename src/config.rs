// src/config.rs

//! Configuration loading.
//!
//! File first, then environment overrides, then validation.

use std::path::Path;

use crate::error::Result;
use crate::models::Config;

/// Load configuration from `path` (defaults if missing), apply
/// environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn load_config_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;
    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}
