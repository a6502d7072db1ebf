//! Plugin Manifest Model
//!
//! Typed description of a plugin as declared in its `plugin.json`.
//! Manifests are immutable once discovered and are re-read on every
//! discovery scan; plugins never mutate them.

use serde::{Deserialize, Serialize};

use crate::plugin::error::{HostError, HostResult};

/// Plugin manifest as declared in `plugin.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(rename = "type", default)]
    pub plugin_type: PluginType,
    pub main: String,
    #[serde(default)]
    pub activation_events: Vec<String>,
    #[serde(default)]
    pub contributes: Option<Contributions>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// How the plugin's entry point is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Script source loaded into a sandboxed Lua context
    #[default]
    Interpreted,
    /// In-process program registered with the host
    Native,
}

/// Everything a plugin contributes to the editor surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contributions {
    #[serde(default)]
    pub commands: Option<Vec<CommandContribution>>,
    #[serde(default)]
    pub languages: Option<Vec<LanguageContribution>>,
    #[serde(default)]
    pub themes: Option<Vec<ThemeContribution>>,
    #[serde(default)]
    pub views: Option<Vec<ViewContribution>>,
    #[serde(default)]
    pub keybindings: Option<Vec<KeybindingContribution>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandContribution {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageContribution {
    pub id: String,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeContribution {
    pub id: String,
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewContribution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeybindingContribution {
    pub command: String,
    pub key: String,
    #[serde(default)]
    pub when: Option<String>,
}

impl PluginManifest {
    /// Parse and validate a manifest from JSON text
    pub fn from_json(content: &str) -> HostResult<Self> {
        let manifest: PluginManifest = serde_json::from_str(content)
            .map_err(|e| HostError::manifest_invalid(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate required fields beyond what deserialization enforces
    pub fn validate(&self) -> HostResult<()> {
        if self.id.trim().is_empty() {
            return Err(HostError::manifest_invalid("plugin id cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(HostError::manifest_invalid("plugin name cannot be empty"));
        }
        if self.main.trim().is_empty() {
            return Err(HostError::manifest_invalid("entry point cannot be empty"));
        }
        if !is_valid_version(&self.version) {
            return Err(HostError::manifest_invalid(format!(
                "invalid version format: {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Check whether the manifest declares a capability permission
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Basic version validation (simplified semver)
fn is_valid_version(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return false;
    }
    parts.iter().all(|part| part.parse::<u32>().is_ok())
}
