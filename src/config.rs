// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Portal configuration.
//!
//! Stored as `~/.grameen/config.json`. Every field has a default, so a
//! missing file, or a file with only some keys, is fine. After loading,
//! `GRAMEEN_DATA_DIR`, `GRAMEEN_LANG` and `GRAMEEN_USER` override the file;
//! command line flags override both (applied by the binary).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::download::{TickSettings, COMPLETE, DEFAULT_TICK_INCREMENT, DEFAULT_TICK_INTERVAL};
use crate::types::Language;

/// Directory name under the home directory.
const CONFIG_DIR_NAME: &str = ".grameen";
const CONFIG_FILE_NAME: &str = "config.json";
const DATA_DIR_NAME: &str = "data";

pub const ENV_DATA_DIR: &str = "GRAMEEN_DATA_DIR";
pub const ENV_LANG: &str = "GRAMEEN_LANG";
pub const ENV_USER: &str = "GRAMEEN_USER";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalConfig {
    /// Directory of the progress store (default: ~/.grameen/data)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Initial catalog language
    #[serde(default)]
    pub language: Language,
    /// Default identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Milliseconds between progress ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Progress added per tick
    #[serde(default = "default_tick_increment")]
    pub tick_increment: u8,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_tick_increment() -> u8 {
    DEFAULT_TICK_INCREMENT
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            language: Language::default(),
            user: None,
            tick_interval_ms: default_tick_interval_ms(),
            tick_increment: default_tick_increment(),
        }
    }
}

/// `~/.grameen`
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// `~/.grameen/config.json`
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

impl PortalConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&config_path()?)?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Load from `path`, defaulting when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(config.validated())
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides, reading variables through `lookup`.
    ///
    /// Blank values are ignored. An unknown language keeps the current one.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(code) = get(ENV_LANG) {
            match code.parse::<Language>() {
                Ok(language) => self.language = language,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_LANG, e),
            }
        }
        if let Some(user) = get(ENV_USER) {
            self.user = Some(user.trim().to_string());
        }
        self
    }

    /// Replace out-of-range values with defaults.
    pub fn validated(mut self) -> Self {
        if self.tick_interval_ms == 0 {
            tracing::warn!(
                "tick_interval_ms must be positive, using {}",
                default_tick_interval_ms()
            );
            self.tick_interval_ms = default_tick_interval_ms();
        }
        if self.tick_increment == 0 || self.tick_increment > COMPLETE {
            tracing::warn!(
                "tick_increment {} out of range 1..={}, using {}",
                self.tick_increment,
                COMPLETE,
                default_tick_increment()
            );
            self.tick_increment = default_tick_increment();
        }
        if self.user.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.user = None;
        }
        self
    }

    /// Store directory, falling back to `~/.grameen/data`.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join(DATA_DIR_NAME)),
        }
    }

    pub fn tick_settings(&self) -> TickSettings {
        TickSettings {
            interval: Duration::from_millis(self.tick_interval_ms),
            increment: self.tick_increment,
        }
    }
}
