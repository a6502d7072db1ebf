//! Host Configuration
//!
//! TOML-backed settings with a discovery hierarchy: an explicit path
//! wins, then the `MIDE_HOST_CONFIG` environment variable, then the
//! user config file, then built-in defaults. Missing files at the lower
//! tiers are not errors.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MIDE_HOST_CONFIG";

/// Plugin host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory scanned for installed plugins
    pub plugin_dir: PathBuf,
    /// Path to a marketplace feed file
    pub marketplace_feed: Option<PathBuf>,
    /// Gate capability calls on manifest permissions
    pub enforce_permissions: bool,
    /// Log file path; console-only when unset
    pub log_file: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            marketplace_feed: None,
            enforce_permissions: true,
            log_file: None,
        }
    }
}

fn default_plugin_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mide")
        .join("plugins")
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mide").join("host.toml"))
}

impl HostConfig {
    /// Resolve configuration through the discovery hierarchy
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&env_path));
        }
        if let Some(user_path) = user_config_path() {
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
