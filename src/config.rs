//! # Configuration
//!
//! Optional user configuration read from `~/.config/recent-dirs/config.json`.
//! Every field has a default and the file does not need to exist; a broken
//! file falls back to defaults, so the daemon always starts.
//!
//! ## File Location
//!
//! ```text
//! ~/.config/recent-dirs/config.json
//! ```
//!
//! ## Example
//!
//! ```json
//! {
//!   "poll_interval_secs": 10,
//!   "history_path": "/home/user/.rd-history.json"
//! }
//! ```
//!
//! The `directories` crate resolves the platform-appropriate config, data,
//! and runtime directories.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon and client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between sweeps of process working directories.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds between history snapshots. A snapshot is only written when
    /// something changed since the last one.
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,

    /// History file location; defaults to the XDG data directory.
    #[serde(default)]
    pub history_path: Option<PathBuf>,

    /// Daemon socket location; defaults to the XDG runtime directory.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_save_interval_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            save_interval_secs: default_save_interval_secs(),
            history_path: None,
            socket_path: None,
        }
    }
}

impl Config {
    /// Load configuration from disk. Returns `Config::default()` if the file
    /// does not exist or cannot be parsed.
    pub fn load() -> Self {
        Self::try_load().unwrap_or_default()
    }

    fn try_load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path. Returns `Config::default()`
    /// if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// How often process working directories are swept.
    pub fn poll_interval(&self) -> Duration {
        // a zero interval would make the timer panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// How often the history snapshot timer fires.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }

    /// Where the history file lives.
    pub fn history_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.history_path {
            return Ok(path.clone());
        }
        Ok(Self::project_dirs()?.data_dir().join("history.json"))
    }

    /// Where the daemon socket lives. Prefers the per-user runtime directory
    /// and falls back to the data directory on systems without one.
    pub fn socket_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.socket_path {
            return Ok(path.clone());
        }
        let dirs = Self::project_dirs()?;
        let base = dirs.runtime_dir().unwrap_or_else(|| dirs.data_dir());
        Ok(base.join("rd.sock"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.json"))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "recent-dirs").context("Could not determine home directory")
    }
}
