//! Plugin Manager
//!
//! Top-level lifecycle orchestration: discovery, enable/disable,
//! install/uninstall, command routing, and event publication. One
//! manager owns the command registry, the event bus, and every live
//! isolation channel; plugin-owned registrations are purged when their
//! plugin unloads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::plugin::bridge::CapabilityBroker;
use crate::plugin::channel::PluginChannel;
use crate::plugin::discovery::{PluginDiscovery, MANIFEST_FILE};
use crate::plugin::error::{HostError, HostResult};
use crate::plugin::events::EventBus;
use crate::plugin::lua::LuaProgram;
use crate::plugin::manifest::{PluginManifest, PluginType};
use crate::plugin::marketplace::MarketplaceEntry;
use crate::plugin::protocol::{EditorEvent, HostMessage, PluginMessage};
use crate::plugin::registry::{self, CommandRegistry};
use crate::plugin::traits::ExtensionProgram;
use crate::plugin::workspace::WorkspaceServices;

/// Factory for native plugin programs registered with the host
pub type NativeProgramFactory = Box<dyn Fn() -> Box<dyn ExtensionProgram> + Send + Sync>;

struct LoadedPlugin {
    manifest: PluginManifest,
    channel: PluginChannel,
    pump: JoinHandle<()>,
}

/// Orchestrates the full plugin lifecycle for one plugin directory
pub struct PluginManager {
    discovery: PluginDiscovery,
    manifests: RwLock<Vec<PluginManifest>>,
    loaded: Mutex<HashMap<String, LoadedPlugin>>,
    registry: Arc<CommandRegistry>,
    bus: Arc<EventBus>,
    broker: Arc<CapabilityBroker>,
    native_factories: RwLock<HashMap<String, NativeProgramFactory>>,
}

impl PluginManager {
    pub fn new<P: AsRef<Path>>(
        plugin_directory: P,
        workspace: Arc<dyn WorkspaceServices>,
        enforce_permissions: bool,
    ) -> Self {
        let registry = Arc::new(CommandRegistry::new());
        let bus = Arc::new(EventBus::new());
        let broker = Arc::new(CapabilityBroker::new(
            workspace,
            registry.clone(),
            bus.clone(),
            enforce_permissions,
        ));
        Self {
            discovery: PluginDiscovery::new(plugin_directory),
            manifests: RwLock::new(Vec::new()),
            loaded: Mutex::new(HashMap::new()),
            registry,
            bus,
            broker,
            native_factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn plugin_directory(&self) -> &Path {
        self.discovery.plugin_directory()
    }

    /// Register an in-process program for a `native` manifest's id
    pub fn register_native_program(&self, plugin_id: &str, factory: NativeProgramFactory) {
        self.native_factories.write().insert(plugin_id.to_string(), factory);
    }

    /// Rescan the plugin directory, replacing the known-manifest list.
    ///
    /// Already-loaded plugins keep running on their old manifest until
    /// disabled.
    pub async fn discover(&self) -> HostResult<Vec<PluginManifest>> {
        let manifests = self.discovery.discover().await?;
        info!("Discovered {} plugin(s)", manifests.len());
        *self.manifests.write() = manifests.clone();
        Ok(manifests)
    }

    pub fn manifests(&self) -> Vec<PluginManifest> {
        self.manifests.read().clone()
    }

    pub fn manifest(&self, plugin_id: &str) -> Option<PluginManifest> {
        self.manifests.read().iter().find(|m| m.id == plugin_id).cloned()
    }

    pub async fn is_loaded(&self, plugin_id: &str) -> bool {
        self.loaded.lock().await.contains_key(plugin_id)
    }

    pub async fn loaded_ids(&self) -> Vec<String> {
        self.loaded.lock().await.keys().cloned().collect()
    }

    /// Load and activate a plugin. A no-op when it is already loaded.
    pub async fn enable(&self, plugin_id: &str) -> HostResult<()> {
        let manifest = self
            .manifest(plugin_id)
            .ok_or_else(|| HostError::plugin_not_found(plugin_id))?;

        let mut loaded = self.loaded.lock().await;
        if loaded.contains_key(plugin_id) {
            return Ok(());
        }

        let program: Box<dyn ExtensionProgram> = match manifest.plugin_type {
            PluginType::Interpreted => {
                let source = self.discovery.load_plugin_source(&manifest).await?;
                Box::new(LuaProgram::load(plugin_id, source)?)
            }
            PluginType::Native => {
                let factories = self.native_factories.read();
                let factory = factories.get(plugin_id).ok_or_else(|| {
                    HostError::channel_construction_failed(format!(
                        "no native program registered for '{}'",
                        plugin_id
                    ))
                })?;
                factory()
            }
        };

        let (channel, plugin_rx) = PluginChannel::spawn(plugin_id, program);
        let pump = self.spawn_plugin_pump(manifest.clone(), channel.sender(), plugin_rx);
        channel.send(HostMessage::Activate)?;

        info!("Enabled plugin '{}' v{}", manifest.id, manifest.version);
        loaded.insert(
            plugin_id.to_string(),
            LoadedPlugin { manifest, channel, pump },
        );
        Ok(())
    }

    /// Enable every discovered plugin whose manifest is marked enabled.
    ///
    /// Failures are collected per plugin instead of aborting the sweep.
    pub async fn enable_all(&self) -> Vec<(String, HostError)> {
        let mut failures = Vec::new();
        for manifest in self.manifests() {
            if !manifest.enabled {
                continue;
            }
            if let Err(e) = self.enable(&manifest.id).await {
                warn!("Failed to enable '{}': {}", manifest.id, e);
                failures.push((manifest.id, e));
            }
        }
        failures
    }

    /// Drains context-bound traffic: command registrations land in the
    /// registry, capability calls go through the broker and return as
    /// correlated responses.
    fn spawn_plugin_pump(
        &self,
        manifest: PluginManifest,
        host_tx: UnboundedSender<HostMessage>,
        mut plugin_rx: UnboundedReceiver<PluginMessage>,
    ) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let broker = self.broker.clone();
        tokio::spawn(async move {
            while let Some(message) = plugin_rx.recv().await {
                match message {
                    PluginMessage::RegisterCommand { command_id } => {
                        let route_tx = host_tx.clone();
                        let routed_id = command_id.clone();
                        let owner_id = manifest.id.clone();
                        let handler = registry::handler(move |args| {
                            let route_tx = route_tx.clone();
                            let command_id = routed_id.clone();
                            let owner_id = owner_id.clone();
                            async move {
                                // Fire-and-forget into the context;
                                // results stay plugin-side
                                route_tx
                                    .send(HostMessage::ExecuteCommand { command_id, args })
                                    .map_err(|_| HostError::channel_closed(owner_id))?;
                                Ok(Value::Null)
                            }
                        });
                        registry.register(&command_id, Some(&manifest.id), handler);
                    }
                    PluginMessage::ApiCall { call_id, request } => {
                        let reply = match broker.handle(&manifest, &host_tx, request).await {
                            Ok(result) => HostMessage::ApiResponse { call_id, result },
                            Err(e) => HostMessage::ApiError { call_id, error: e.to_string() },
                        };
                        if host_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Tear down a plugin's context and purge everything it registered.
    /// A no-op when the plugin is not loaded.
    pub async fn disable(&self, plugin_id: &str) -> HostResult<()> {
        let Some(plugin) = self.loaded.lock().await.remove(plugin_id) else {
            return Ok(());
        };
        plugin.channel.close().await;
        plugin.pump.await?;

        let purged_commands = self.registry.purge_owner(plugin_id);
        let purged_subscriptions = self.bus.purge(plugin_id);
        info!(
            "Disabled plugin '{}' v{} ({} command(s), {} subscription(s) purged)",
            plugin_id,
            plugin.manifest.version,
            purged_commands.len(),
            purged_subscriptions
        );
        Ok(())
    }

    /// Install a plugin package from a local directory.
    ///
    /// Remote sources are rejected; the directory must contain a
    /// manifest. The package is copied under the plugin directory and
    /// the manifest list refreshed.
    pub async fn install(&self, source: &str, plugin_id: &str) -> HostResult<PluginManifest> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Err(HostError::install_failed(
                "remote plugin packages are not supported; download and install from a local path",
            ));
        }
        let source_dir = PathBuf::from(source.strip_prefix("file://").unwrap_or(source));
        if !source_dir.is_dir() {
            return Err(HostError::install_failed(format!(
                "source is not a directory: {}",
                source_dir.display()
            )));
        }
        let manifest_path = source_dir.join(MANIFEST_FILE);
        let manifest_json = tokio::fs::read_to_string(&manifest_path).await.map_err(|e| {
            HostError::install_failed(format!("missing {}: {}", MANIFEST_FILE, e))
        })?;
        let manifest = PluginManifest::from_json(&manifest_json)?;

        let target = self.discovery.plugin_path(plugin_id);
        copy_dir(&source_dir, &target).await?;
        info!("Installed plugin '{}' to {}", plugin_id, target.display());

        self.discover().await?;
        self.manifest(plugin_id)
            .ok_or_else(|| HostError::install_failed("installed package failed discovery"))
    }

    /// Install a marketplace entry from its local source path
    pub async fn install_from(&self, entry: &MarketplaceEntry) -> HostResult<PluginManifest> {
        let source = entry.source.as_deref().ok_or_else(|| {
            HostError::install_failed(format!("marketplace entry '{}' has no source", entry.id))
        })?;
        self.install(source, &entry.id).await
    }

    /// Disable and delete a plugin package, then refresh the manifest list
    pub async fn uninstall(&self, plugin_id: &str) -> HostResult<()> {
        self.disable(plugin_id).await?;
        let path = self.discovery.plugin_path(plugin_id);
        if !path.exists() {
            return Err(HostError::plugin_not_found(plugin_id));
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| HostError::install_failed(format!("failed to remove {}: {}", path.display(), e)))?;
        info!("Uninstalled plugin '{}'", plugin_id);
        self.discover().await?;
        Ok(())
    }

    /// Execute any registered command, host-native or plugin-owned
    pub async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
        self.registry.execute(command_id, args).await
    }

    pub fn notify_file_opened(&self, path: &str) -> usize {
        self.bus.publish(&EditorEvent::FileOpened { path: path.to_string() })
    }

    pub fn notify_file_saved(&self, path: &str) -> usize {
        self.bus.publish(&EditorEvent::FileSaved { path: path.to_string() })
    }

    pub fn notify_file_changed(&self, path: &str, content: &str) -> usize {
        self.bus.publish(&EditorEvent::FileChanged {
            path: path.to_string(),
            content: content.to_string(),
        })
    }

    /// Disable every loaded plugin, in no particular order
    pub async fn shutdown(&self) {
        let ids = self.loaded_ids().await;
        for id in ids {
            if let Err(e) = self.disable(&id).await {
                warn!("Failed to disable '{}' during shutdown: {}", id, e);
            }
        }
    }
}

/// Recursive directory copy used by install
async fn copy_dir(source: &Path, target: &Path) -> HostResult<()> {
    tokio::fs::create_dir_all(target)
        .await
        .map_err(|e| HostError::install_failed(format!("failed to create {}: {}", target.display(), e)))?;

    let mut stack = vec![(source.to_path_buf(), target.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .map_err(|e| HostError::install_failed(format!("failed to read {}: {}", from.display(), e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HostError::install_failed(e.to_string()))?
        {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            if from_path.is_dir() {
                tokio::fs::create_dir_all(&to_path)
                    .await
                    .map_err(|e| HostError::install_failed(e.to_string()))?;
                stack.push((from_path, to_path));
            } else {
                tokio::fs::copy(&from_path, &to_path)
                    .await
                    .map_err(|e| HostError::install_failed(e.to_string()))?;
            }
        }
    }
    Ok(())
}
