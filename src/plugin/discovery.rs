//! Plugin Discovery
//!
//! Scans the plugin directory for manifests, one plugin per subdirectory.
//! Malformed manifests are logged and dropped so a single broken plugin
//! never blocks listing the rest.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs;

use crate::plugin::error::{HostError, HostResult};
use crate::plugin::manifest::PluginManifest;

/// Manifest file name expected in each plugin subdirectory
pub const MANIFEST_FILE: &str = "plugin.json";

/// File-based plugin discovery over a single plugin directory
#[derive(Debug, Clone)]
pub struct PluginDiscovery {
    plugin_directory: PathBuf,
}

impl PluginDiscovery {
    pub fn new<P: AsRef<Path>>(plugin_directory: P) -> Self {
        Self {
            plugin_directory: plugin_directory.as_ref().to_path_buf(),
        }
    }

    pub fn plugin_directory(&self) -> &Path {
        &self.plugin_directory
    }

    /// Directory a plugin package lives in (or would live in once installed)
    pub fn plugin_path(&self, plugin_id: &str) -> PathBuf {
        self.plugin_directory.join(plugin_id)
    }

    /// Scan the plugin directory and return every valid manifest.
    ///
    /// The directory is created if missing. Result ordering is
    /// directory-scan order; callers re-sort as needed.
    pub async fn discover(&self) -> HostResult<Vec<PluginManifest>> {
        if !self.plugin_directory.exists() {
            fs::create_dir_all(&self.plugin_directory).await.map_err(|e| {
                HostError::discovery_failed(format!(
                    "failed to create plugin directory {}: {}",
                    self.plugin_directory.display(),
                    e
                ))
            })?;
        }

        let mut manifests = Vec::new();
        let mut entries = fs::read_dir(&self.plugin_directory).await.map_err(|e| {
            HostError::discovery_failed(format!(
                "failed to read plugin directory {}: {}",
                self.plugin_directory.display(),
                e
            ))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HostError::discovery_failed(format!("failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.exists() {
                continue;
            }
            match load_manifest(&manifest_path).await {
                Ok(manifest) => {
                    debug!("Discovered plugin '{}' at {}", manifest.id, path.display());
                    manifests.push(manifest);
                }
                Err(e) => {
                    // Partial success is expected; skip and keep scanning
                    warn!("Skipping plugin at {}: {}", path.display(), e);
                }
            }
        }

        Ok(manifests)
    }

    /// Read the entry-point source referenced by a manifest's `main`
    pub async fn load_plugin_source(&self, manifest: &PluginManifest) -> HostResult<String> {
        let main_path = self.plugin_path(&manifest.id).join(&manifest.main);
        fs::read_to_string(&main_path).await.map_err(|e| {
            HostError::channel_construction_failed(format!(
                "failed to read entry point {}: {}",
                main_path.display(),
                e
            ))
        })
    }
}

async fn load_manifest(path: &Path) -> HostResult<PluginManifest> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| HostError::manifest_invalid(format!("unreadable manifest: {}", e)))?;
    PluginManifest::from_json(&content)
}
