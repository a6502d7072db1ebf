//! Plugin Host Error Types
//!
//! Error taxonomy for manifest handling, command dispatch, isolation
//! channels, and capability calls.

use thiserror::Error;

/// Result type for plugin host operations
pub type HostResult<T> = Result<T, HostError>;

/// Error types for plugin host operations
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Manifest failed required-field validation or did not parse
    #[error("Invalid plugin manifest: {message}")]
    ManifestInvalid { message: String },

    /// Execute was called on an unregistered command id
    #[error("Command not found: {command_id}")]
    CommandNotFound { command_id: String },

    /// The plugin execution context could not be constructed
    #[error("Failed to construct plugin context: {message}")]
    ChannelConstructionFailed { message: String },

    /// An operation was issued against a torn-down context
    #[error("Plugin channel closed: {plugin_id}")]
    ChannelClosed { plugin_id: String },

    /// Bridge-level file read failure
    #[error("Failed to read file {path}: {message}")]
    FileRead { path: String, message: String },

    /// Bridge-level file write failure
    #[error("Failed to write file {path}: {message}")]
    FileWrite { path: String, message: String },

    /// Capability call outside the manifest's declared permission set
    #[error("Plugin '{plugin_id}' lacks permission '{permission}'")]
    PermissionDenied { plugin_id: String, permission: String },

    /// No manifest is known for the given plugin id
    #[error("Plugin not found: {plugin_id}")]
    PluginNotFound { plugin_id: String },

    /// Plugin package install or uninstall failure
    #[error("Plugin installation failed: {message}")]
    InstallFailed { message: String },

    /// Marketplace feed could not be read or parsed
    #[error("Marketplace catalog error: {message}")]
    CatalogError { message: String },

    /// Context-side view of an `apiError` reply
    #[error("Capability call rejected: {message}")]
    CapabilityRejected { message: String },

    /// Plugin directory scan failure
    #[error("Plugin discovery error: {message}")]
    DiscoveryFailed { message: String },

    /// Event delivery to a subscribed context failed
    #[error("Event delivery failed: {message}")]
    EventDeliveryFailed { message: String },

    /// Generic plugin host error
    #[error("Plugin host error: {message}")]
    Generic { message: String },
}

impl HostError {
    /// Create a manifest validation error
    pub fn manifest_invalid<S: Into<String>>(message: S) -> Self {
        Self::ManifestInvalid { message: message.into() }
    }

    /// Create a command not found error
    pub fn command_not_found<S: Into<String>>(command_id: S) -> Self {
        Self::CommandNotFound { command_id: command_id.into() }
    }

    /// Create a channel construction error
    pub fn channel_construction_failed<S: Into<String>>(message: S) -> Self {
        Self::ChannelConstructionFailed { message: message.into() }
    }

    /// Create a channel closed error
    pub fn channel_closed<S: Into<String>>(plugin_id: S) -> Self {
        Self::ChannelClosed { plugin_id: plugin_id.into() }
    }

    /// Create a file read error
    pub fn file_read<S: Into<String>, M: Into<String>>(path: S, message: M) -> Self {
        Self::FileRead { path: path.into(), message: message.into() }
    }

    /// Create a file write error
    pub fn file_write<S: Into<String>, M: Into<String>>(path: S, message: M) -> Self {
        Self::FileWrite { path: path.into(), message: message.into() }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>, P: Into<String>>(plugin_id: S, permission: P) -> Self {
        Self::PermissionDenied { plugin_id: plugin_id.into(), permission: permission.into() }
    }

    /// Create a plugin not found error
    pub fn plugin_not_found<S: Into<String>>(plugin_id: S) -> Self {
        Self::PluginNotFound { plugin_id: plugin_id.into() }
    }

    /// Create an install failed error
    pub fn install_failed<S: Into<String>>(message: S) -> Self {
        Self::InstallFailed { message: message.into() }
    }

    /// Create a catalog error
    pub fn catalog_error<S: Into<String>>(message: S) -> Self {
        Self::CatalogError { message: message.into() }
    }

    /// Create a capability rejected error
    pub fn capability_rejected<S: Into<String>>(message: S) -> Self {
        Self::CapabilityRejected { message: message.into() }
    }

    /// Create a discovery failed error
    pub fn discovery_failed<S: Into<String>>(message: S) -> Self {
        Self::DiscoveryFailed { message: message.into() }
    }

    /// Create an event delivery error
    pub fn event_delivery_failed<S: Into<String>>(message: S) -> Self {
        Self::EventDeliveryFailed { message: message.into() }
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic { message: message.into() }
    }

    /// Check if the error is contained to a single call and the plugin
    /// can keep running
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HostError::CommandNotFound { .. }
                | HostError::CapabilityRejected { .. }
                | HostError::FileRead { .. }
                | HostError::FileWrite { .. }
                | HostError::PermissionDenied { .. }
                | HostError::EventDeliveryFailed { .. }
        )
    }

    /// Check if the error relates to plugin lifecycle transitions
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            HostError::ChannelConstructionFailed { .. }
                | HostError::ChannelClosed { .. }
                | HostError::PluginNotFound { .. }
        )
    }
}

// Allow conversion from common error types
impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        HostError::generic(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::generic(format!("JSON error: {}", err))
    }
}

impl From<tokio::task::JoinError> for HostError {
    fn from(err: tokio::task::JoinError) -> Self {
        HostError::generic(format!("Task join error: {}", err))
    }
}

impl From<mlua::Error> for HostError {
    fn from(err: mlua::Error) -> Self {
        HostError::generic(format!("Lua error: {}", err))
    }
}
