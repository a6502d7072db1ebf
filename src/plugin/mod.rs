//! Plugin System Module
//!
//! Manifest-driven plugin host with per-plugin isolation channels.
//! Plugins are discovered from a plugin directory, run as sandboxed
//! Lua scripts or in-process native programs, and reach the editor
//! only through the capability bridge, which correlates async
//! request/response pairs and gates each call on declared permissions.

pub mod bridge;
pub mod channel;
pub mod discovery;
pub mod error;
pub mod events;
pub mod lua;
pub mod manager;
pub mod manifest;
pub mod marketplace;
pub mod protocol;
pub mod registry;
pub mod traits;
pub mod workspace;

#[cfg(test)]
pub mod tests;

// Re-export core types for easier access
pub use bridge::{CapabilityBroker, ExtensionApi};
pub use channel::PluginChannel;
pub use discovery::{PluginDiscovery, MANIFEST_FILE};
pub use error::{HostError, HostResult};
pub use events::EventBus;
pub use lua::LuaProgram;
pub use manager::{NativeProgramFactory, PluginManager};
pub use manifest::{PluginManifest, PluginType};
pub use marketplace::{MarketplaceCatalog, MarketplaceEntry};
pub use protocol::{CapabilityRequest, EditorEvent, EventKind, HostMessage, PluginMessage, Severity};
pub use registry::{CommandHandler, CommandRegistry};
pub use traits::ExtensionProgram;
pub use workspace::{EditorWorkspace, OpenFile, WorkspaceServices};
