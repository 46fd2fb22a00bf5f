// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent user configuration.
//!
//! A small TOML file at `~/.config/runicorn/config.toml` holding settings
//! that survive across invocations, most importantly the user-chosen data
//! root. Environment variables always win over the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Errors loading or saving the user config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("no config directory available")]
    NoConfigDir,
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// User-chosen data root; overrides the platform default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_root: Option<PathBuf>,
}

impl UserConfig {
    /// Default config file path (`~/.config/runicorn/config.toml`).
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join("runicorn").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default path; a missing file is an empty config.
    pub fn load_default() -> Result<UserConfig, ConfigError> {
        Self::load(&Self::default_path()?)
    }

    /// Load from an explicit path; a missing file is an empty config.
    pub fn load(path: &std::path::Path) -> Result<UserConfig, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist to an explicit path, creating parent directories.
    pub fn save(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
