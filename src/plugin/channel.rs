//! Isolation Channel
//!
//! Per-plugin execution context. Two tasks cooperate per channel: a
//! router that drains host messages and completes pending capability
//! calls, and a worker that runs the program's entry points one at a
//! time. Splitting them keeps response correlation live while a command
//! handler is mid-flight, so a program can await api calls from inside
//! `execute_command` without deadlocking its own message loop.

use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::plugin::bridge::ExtensionApi;
use crate::plugin::error::{HostError, HostResult};
use crate::plugin::protocol::{EditorEvent, HostMessage, PluginMessage, Severity};
use crate::plugin::traits::ExtensionProgram;

/// Work items queued for the program worker, in arrival order
enum Invocation {
    Activate,
    Command { command_id: String, args: Vec<Value> },
    Event(EditorEvent),
}

/// Handle to a running plugin execution context
pub struct PluginChannel {
    plugin_id: String,
    host_tx: UnboundedSender<HostMessage>,
    router: JoinHandle<()>,
    worker: JoinHandle<()>,
    api: ExtensionApi,
}

impl PluginChannel {
    /// Construct the context and start its tasks.
    ///
    /// Returns the channel handle plus the receiver for messages the
    /// program sends toward the host (command registrations and
    /// capability calls); the caller owns pumping that side.
    pub fn spawn(
        plugin_id: &str,
        program: Box<dyn ExtensionProgram>,
    ) -> (Self, UnboundedReceiver<PluginMessage>) {
        let (host_tx, host_rx) = mpsc::unbounded_channel::<HostMessage>();
        let (plugin_tx, plugin_rx) = mpsc::unbounded_channel::<PluginMessage>();
        let (invoke_tx, invoke_rx) = mpsc::unbounded_channel::<Invocation>();

        let api = ExtensionApi::new(plugin_id, plugin_tx);

        let router = tokio::spawn(run_router(plugin_id.to_string(), host_rx, invoke_tx, api.clone()));
        let worker = tokio::spawn(run_program_loop(
            plugin_id.to_string(),
            program,
            invoke_rx,
            api.clone(),
        ));

        let channel = Self {
            plugin_id: plugin_id.to_string(),
            host_tx,
            router,
            worker,
            api,
        };
        (channel, plugin_rx)
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Sender for host messages into this context
    pub fn sender(&self) -> UnboundedSender<HostMessage> {
        self.host_tx.clone()
    }

    pub fn api(&self) -> &ExtensionApi {
        &self.api
    }

    pub fn send(&self, message: HostMessage) -> HostResult<()> {
        self.host_tx
            .send(message)
            .map_err(|_| HostError::channel_closed(&self.plugin_id))
    }

    /// Orderly teardown: deliver shutdown, wait for both tasks to finish.
    ///
    /// The router rejects every pending capability call before exiting,
    /// so contexts blocked inside an api call unblock with an error
    /// instead of hanging.
    pub async fn close(self) {
        if self.host_tx.send(HostMessage::Shutdown).is_err() {
            debug!("Channel for '{}' already drained at shutdown", self.plugin_id);
        }
        if let Err(e) = self.router.await {
            warn!("Router task for '{}' ended abnormally: {}", self.plugin_id, e);
        }
        if let Err(e) = self.worker.await {
            warn!("Worker task for '{}' ended abnormally: {}", self.plugin_id, e);
        }
    }
}

async fn run_router(
    plugin_id: String,
    mut host_rx: UnboundedReceiver<HostMessage>,
    invoke_tx: UnboundedSender<Invocation>,
    api: ExtensionApi,
) {
    while let Some(message) = host_rx.recv().await {
        match message {
            HostMessage::Activate => {
                if invoke_tx.send(Invocation::Activate).is_err() {
                    break;
                }
            }
            HostMessage::ExecuteCommand { command_id, args } => {
                if invoke_tx.send(Invocation::Command { command_id, args }).is_err() {
                    break;
                }
            }
            HostMessage::Event { event } => {
                if invoke_tx.send(Invocation::Event(event)).is_err() {
                    break;
                }
            }
            HostMessage::ApiResponse { call_id, result } => {
                api.complete(call_id, Ok(result));
            }
            HostMessage::ApiError { call_id, error } => {
                api.complete(call_id, Err(error));
            }
            HostMessage::Shutdown => break,
        }
    }
    // Closing the invocation queue lets the worker drain and deactivate;
    // rejecting pending calls unblocks anything awaiting a reply.
    drop(invoke_tx);
    api.reject_all();
    debug!("Router for '{}' stopped", plugin_id);
}

async fn run_program_loop(
    plugin_id: String,
    mut program: Box<dyn ExtensionProgram>,
    mut invoke_rx: UnboundedReceiver<Invocation>,
    api: ExtensionApi,
) {
    while let Some(invocation) = invoke_rx.recv().await {
        match invocation {
            Invocation::Activate => {
                if let Err(e) = program.activate(api.clone()).await {
                    error!("Activation of '{}' failed: {}", plugin_id, e);
                }
            }
            Invocation::Command { command_id, args } => {
                if let Err(e) = program.execute_command(&command_id, args).await {
                    error!("Command '{}' in '{}' failed: {}", command_id, plugin_id, e);
                    // Surface the fault to the user without taking the
                    // worker down with it
                    let api = api.clone();
                    let notice = format!("Plugin '{}' command '{}' failed: {}", plugin_id, command_id, e);
                    tokio::spawn(async move {
                        let _ = api.show_message(Severity::Error, &notice).await;
                    });
                }
            }
            Invocation::Event(event) => {
                let name = event.name();
                if let Err(e) = program.handle_event(event).await {
                    error!("Event {} in '{}' failed: {}", name, plugin_id, e);
                }
            }
        }
    }
    if let Err(e) = program.deactivate().await {
        warn!("Deactivation of '{}' failed: {}", plugin_id, e);
    }
    debug!("Worker for '{}' stopped", plugin_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use parking_lot::Mutex;

    struct Recording {
        activated: bool,
        commands: Vec<(String, Vec<Value>)>,
        events: Vec<String>,
        deactivated: bool,
    }

    struct RecorderProgram {
        log: Arc<Mutex<Recording>>,
    }

    #[async_trait]
    impl ExtensionProgram for RecorderProgram {
        async fn activate(&mut self, _api: ExtensionApi) -> HostResult<()> {
            self.log.lock().activated = true;
            Ok(())
        }

        async fn execute_command(&mut self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
            self.log.lock().commands.push((command_id.to_string(), args));
            Ok(Value::Null)
        }

        async fn handle_event(&mut self, event: EditorEvent) -> HostResult<()> {
            self.log.lock().events.push(event.name().to_string());
            Ok(())
        }

        async fn deactivate(&mut self) -> HostResult<()> {
            self.log.lock().deactivated = true;
            Ok(())
        }
    }

    fn recorder() -> (Box<dyn ExtensionProgram>, Arc<Mutex<Recording>>) {
        let log = Arc::new(Mutex::new(Recording {
            activated: false,
            commands: Vec::new(),
            events: Vec::new(),
            deactivated: false,
        }));
        (Box::new(RecorderProgram { log: log.clone() }), log)
    }

    #[tokio::test]
    async fn test_lifecycle_ordering() {
        let (program, log) = recorder();
        let (channel, _plugin_rx) = PluginChannel::spawn("rec", program);

        channel.send(HostMessage::Activate).unwrap();
        channel
            .send(HostMessage::ExecuteCommand {
                command_id: "rec.go".to_string(),
                args: vec![json!(7)],
            })
            .unwrap();
        channel
            .send(HostMessage::Event {
                event: EditorEvent::FileSaved { path: "/a".to_string() },
            })
            .unwrap();
        channel.close().await;

        let log = log.lock();
        assert!(log.activated);
        assert_eq!(log.commands, vec![("rec.go".to_string(), vec![json!(7)])]);
        assert_eq!(log.events, vec!["file:save".to_string()]);
        assert!(log.deactivated);
    }

    struct CallingProgram;

    #[async_trait]
    impl ExtensionProgram for CallingProgram {
        async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
            // Awaiting a capability call mid-activation must not wedge
            // the channel's message loop
            let active = api.get_active_file().await?;
            assert_eq!(active.as_deref(), Some("/w/a.rs"));
            Ok(())
        }

        async fn execute_command(&mut self, _command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_api_call_during_activation_resolves() {
        let (channel, mut plugin_rx) = PluginChannel::spawn("caller", Box::new(CallingProgram));
        channel.send(HostMessage::Activate).unwrap();

        let Some(PluginMessage::ApiCall { call_id, .. }) = plugin_rx.recv().await else {
            panic!("expected api call");
        };
        channel
            .send(HostMessage::ApiResponse {
                call_id,
                result: json!("/w/a.rs"),
            })
            .unwrap();
        channel.close().await;
    }

    struct StuckProgram;

    #[async_trait]
    impl ExtensionProgram for StuckProgram {
        async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
            // The host never answers this one
            let result = api.get_active_file().await;
            assert!(matches!(result, Err(HostError::ChannelClosed { .. })));
            Ok(())
        }

        async fn execute_command(&mut self, _command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_close_rejects_unanswered_calls() {
        let (channel, mut plugin_rx) = PluginChannel::spawn("stuck", Box::new(StuckProgram));
        channel.send(HostMessage::Activate).unwrap();

        // Let the call get parked, then tear down without answering
        assert!(matches!(
            plugin_rx.recv().await,
            Some(PluginMessage::ApiCall { .. })
        ));
        channel.close().await;
    }

    struct FaultyProgram;

    #[async_trait]
    impl ExtensionProgram for FaultyProgram {
        async fn activate(&mut self, _api: ExtensionApi) -> HostResult<()> {
            Ok(())
        }

        async fn execute_command(&mut self, command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
            if command_id == "bad" {
                Err(HostError::generic("handler exploded"))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    #[tokio::test]
    async fn test_command_fault_is_contained() {
        let (channel, mut plugin_rx) = PluginChannel::spawn("faulty", Box::new(FaultyProgram));
        channel.send(HostMessage::Activate).unwrap();
        channel
            .send(HostMessage::ExecuteCommand { command_id: "bad".to_string(), args: vec![] })
            .unwrap();

        // The fault is reported as a showMessage call, and the worker
        // stays alive for the next command
        let Some(PluginMessage::ApiCall { call_id, request }) = plugin_rx.recv().await else {
            panic!("expected fault notification");
        };
        assert_eq!(request.method_name(), "showMessage");
        channel
            .send(HostMessage::ApiResponse { call_id, result: Value::Null })
            .unwrap();

        channel
            .send(HostMessage::ExecuteCommand { command_id: "good".to_string(), args: vec![] })
            .unwrap();
        channel.close().await;
    }
}
