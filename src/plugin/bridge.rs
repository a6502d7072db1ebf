//! Capability Bridge
//!
//! Two halves of the host API boundary. [`ExtensionApi`] is the
//! context-side handle: it assigns monotonic call ids, parks a oneshot
//! per in-flight call, and resolves it when the router sees the matching
//! response. [`CapabilityBroker`] is the host-side dispatcher that gates
//! each request against the manifest's permissions and executes it
//! against the workspace, registry, or event bus.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::plugin::error::{HostError, HostResult};
use crate::plugin::events::EventBus;
use crate::plugin::manifest::PluginManifest;
use crate::plugin::protocol::{CapabilityRequest, EventKind, HostMessage, PluginMessage, Severity};
use crate::plugin::registry::CommandRegistry;
use crate::plugin::workspace::WorkspaceServices;

type PendingCall = oneshot::Sender<Result<Value, String>>;

/// Context-side capability handle with correlated request/response calls
#[derive(Clone)]
pub struct ExtensionApi {
    plugin_id: Arc<str>,
    outbound: UnboundedSender<PluginMessage>,
    pending: Arc<DashMap<u64, PendingCall>>,
    next_call_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl ExtensionApi {
    pub fn new(plugin_id: &str, outbound: UnboundedSender<PluginMessage>) -> Self {
        Self {
            plugin_id: Arc::from(plugin_id),
            outbound,
            pending: Arc::new(DashMap::new()),
            next_call_id: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Issue a capability request and await the correlated reply
    pub async fn call(&self, request: CapabilityRequest) -> HostResult<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HostError::channel_closed(self.plugin_id.as_ref()));
        }
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(call_id, tx);

        let message = PluginMessage::ApiCall { call_id, request };
        if self.outbound.send(message).is_err() {
            self.pending.remove(&call_id);
            return Err(HostError::channel_closed(self.plugin_id.as_ref()));
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(HostError::capability_rejected(message)),
            // Sender dropped without a reply: the channel was torn down
            Err(_) => Err(HostError::channel_closed(self.plugin_id.as_ref())),
        }
    }

    /// Resolve a pending call with the host's reply.
    ///
    /// Unknown call ids are logged and ignored; a late reply after
    /// teardown is not an error.
    pub fn complete(&self, call_id: u64, result: Result<Value, String>) {
        match self.pending.remove(&call_id) {
            Some((_, tx)) => {
                if tx.send(result).is_err() {
                    debug!("Caller for call {} of '{}' went away", call_id, self.plugin_id);
                }
            }
            None => {
                warn!("Reply for unknown call {} of '{}'", call_id, self.plugin_id);
            }
        }
    }

    /// Tear down the call surface: every in-flight call is rejected and
    /// all future calls fail fast
    pub fn reject_all(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the senders wakes every waiter with a closed error
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Announce a command id this context will handle
    pub fn register_command(&self, command_id: &str) -> HostResult<()> {
        self.outbound
            .send(PluginMessage::RegisterCommand { command_id: command_id.to_string() })
            .map_err(|_| HostError::channel_closed(self.plugin_id.as_ref()))
    }

    // Typed wrappers over the request enum

    pub async fn show_message(&self, severity: Severity, message: &str) -> HostResult<()> {
        self.call(CapabilityRequest::ShowMessage {
            message: message.to_string(),
            severity,
        })
        .await
        .map(|_| ())
    }

    pub async fn get_active_file(&self) -> HostResult<Option<String>> {
        let value = self.call(CapabilityRequest::GetActiveFile).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_open_files(&self) -> HostResult<Vec<String>> {
        let value = self.call(CapabilityRequest::GetOpenFiles).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_workspace_path(&self) -> HostResult<Option<String>> {
        let value = self.call(CapabilityRequest::GetWorkspacePath).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_file_content(&self, path: &str) -> HostResult<Option<String>> {
        let value = self
            .call(CapabilityRequest::GetFileContent { path: path.to_string() })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn read_file(&self, path: &str) -> HostResult<String> {
        let value = self
            .call(CapabilityRequest::ReadFile { path: path.to_string() })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn write_file(&self, path: &str, content: &str) -> HostResult<()> {
        self.call(CapabilityRequest::WriteFile {
            path: path.to_string(),
            content: content.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn set_status_bar_message(&self, message: &str, timeout_ms: Option<u64>) -> HostResult<()> {
        self.call(CapabilityRequest::SetStatusBarMessage {
            message: message.to_string(),
            timeout_ms,
        })
        .await
        .map(|_| ())
    }

    pub async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
        self.call(CapabilityRequest::ExecuteCommand {
            command_id: command_id.to_string(),
            args,
        })
        .await
    }

    pub async fn subscribe(&self, event: EventKind) -> HostResult<()> {
        self.call(CapabilityRequest::Subscribe { event }).await.map(|_| ())
    }

    pub async fn on_file_open(&self) -> HostResult<()> {
        self.subscribe(EventKind::FileOpen).await
    }

    pub async fn on_file_save(&self) -> HostResult<()> {
        self.subscribe(EventKind::FileSave).await
    }

    pub async fn on_file_change(&self) -> HostResult<()> {
        self.subscribe(EventKind::FileChange).await
    }
}

/// Host-side dispatcher for capability requests
pub struct CapabilityBroker {
    workspace: Arc<dyn WorkspaceServices>,
    registry: Arc<CommandRegistry>,
    bus: Arc<EventBus>,
    enforce_permissions: bool,
}

impl CapabilityBroker {
    pub fn new(
        workspace: Arc<dyn WorkspaceServices>,
        registry: Arc<CommandRegistry>,
        bus: Arc<EventBus>,
        enforce_permissions: bool,
    ) -> Self {
        Self {
            workspace,
            registry,
            bus,
            enforce_permissions,
        }
    }

    /// Execute one capability request on behalf of a plugin.
    ///
    /// The permission gate runs before any state is touched. `host_tx`
    /// is the sender into the requesting context, captured by event
    /// subscriptions.
    pub async fn handle(
        &self,
        manifest: &PluginManifest,
        host_tx: &UnboundedSender<HostMessage>,
        request: CapabilityRequest,
    ) -> HostResult<Value> {
        if self.enforce_permissions {
            if let Some(permission) = request.required_permission() {
                if !manifest.has_permission(permission) {
                    return Err(HostError::permission_denied(&manifest.id, permission));
                }
            }
        }

        match request {
            CapabilityRequest::ShowMessage { message, severity } => {
                self.workspace.show_message(severity, &message);
                Ok(Value::Null)
            }
            CapabilityRequest::GetActiveFile => Ok(json!(self.workspace.active_file())),
            CapabilityRequest::GetOpenFiles => Ok(json!(self.workspace.open_files())),
            CapabilityRequest::GetWorkspacePath => Ok(json!(self.workspace.workspace_path())),
            CapabilityRequest::GetFileContent { path } => {
                Ok(json!(self.workspace.file_content(&path)))
            }
            CapabilityRequest::ReadFile { path } => {
                let content = self.workspace.read_file(&path).await?;
                Ok(json!(content))
            }
            CapabilityRequest::WriteFile { path, content } => {
                self.workspace.write_file(&path, &content).await?;
                // A bridge-level write counts as a save for subscribers
                self.bus.publish(&crate::plugin::protocol::EditorEvent::FileSaved { path });
                Ok(Value::Null)
            }
            CapabilityRequest::SetStatusBarMessage { message, timeout_ms } => {
                self.workspace.set_status_bar_message(&message, timeout_ms);
                Ok(Value::Null)
            }
            CapabilityRequest::ExecuteCommand { command_id, args } => {
                self.registry.execute(&command_id, args).await
            }
            CapabilityRequest::Subscribe { event } => {
                self.bus.subscribe(&manifest.id, event, host_tx.clone());
                Ok(Value::Null)
            }
        }
    }
}
