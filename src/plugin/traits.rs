//! Extension Program Interface
//!
//! The behavior contract a plugin's executable half implements, whether
//! it is a sandboxed Lua script or a native Rust program registered with
//! the host. Programs run inside an isolation channel's worker task and
//! only touch the editor through the [`ExtensionApi`] handed to
//! `activate`.

use async_trait::async_trait;
use serde_json::Value;

use crate::plugin::bridge::ExtensionApi;
use crate::plugin::error::HostResult;
use crate::plugin::protocol::EditorEvent;

/// A plugin's executable entry points
#[async_trait]
pub trait ExtensionProgram: Send {
    /// Called once after the channel is constructed. The program keeps
    /// the api handle for later capability calls and registers its
    /// commands here.
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()>;

    /// Invoked for each command routed into this context
    async fn execute_command(&mut self, command_id: &str, args: Vec<Value>) -> HostResult<Value>;

    /// Invoked for each subscribed editor event
    async fn handle_event(&mut self, _event: EditorEvent) -> HostResult<()> {
        Ok(())
    }

    /// Called during orderly teardown, before the context is dropped
    async fn deactivate(&mut self) -> HostResult<()> {
        Ok(())
    }
}
