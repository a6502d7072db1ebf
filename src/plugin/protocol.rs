//! Isolation Channel Wire Protocol
//!
//! Message types exchanged between the host and a plugin execution context.
//! Everything crossing the boundary is serializable; the envelope is a
//! serde-tagged `{kind, data}` pair in both directions. Capability requests
//! are a closed enum so the host dispatches exhaustively instead of
//! forwarding arbitrary method names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity level for user-facing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Parse a severity name, defaulting to `Info` for unknown input
    pub fn parse(name: &str) -> Self {
        match name {
            "warning" | "warn" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Editor lifecycle events observable by plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EditorEvent {
    FileOpened { path: String },
    FileSaved { path: String },
    FileChanged { path: String, content: String },
}

impl EditorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EditorEvent::FileOpened { .. } => EventKind::FileOpen,
            EditorEvent::FileSaved { .. } => EventKind::FileSave,
            EditorEvent::FileChanged { .. } => EventKind::FileChange,
        }
    }

    /// Event-bus channel name for this event
    pub fn name(&self) -> &'static str {
        self.kind().event_name()
    }

    pub fn path(&self) -> &str {
        match self {
            EditorEvent::FileOpened { path }
            | EditorEvent::FileSaved { path }
            | EditorEvent::FileChanged { path, .. } => path,
        }
    }
}

/// The three subscription points exposed to plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    FileOpen,
    FileSave,
    FileChange,
}

impl EventKind {
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::FileOpen => "file:open",
            EventKind::FileSave => "file:save",
            EventKind::FileChange => "file:change",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "file:open" => Some(EventKind::FileOpen),
            "file:save" => Some(EventKind::FileSave),
            "file:change" => Some(EventKind::FileChange),
            _ => None,
        }
    }
}

/// Closed set of capability operations a context may request from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum CapabilityRequest {
    ShowMessage { message: String, severity: Severity },
    GetActiveFile,
    GetOpenFiles,
    GetWorkspacePath,
    GetFileContent { path: String },
    ReadFile { path: String },
    WriteFile { path: String, content: String },
    SetStatusBarMessage { message: String, timeout_ms: Option<u64> },
    ExecuteCommand { command_id: String, args: Vec<Value> },
    Subscribe { event: EventKind },
}

impl CapabilityRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            CapabilityRequest::ShowMessage { .. } => "showMessage",
            CapabilityRequest::GetActiveFile => "getActiveFile",
            CapabilityRequest::GetOpenFiles => "getOpenFiles",
            CapabilityRequest::GetWorkspacePath => "getWorkspacePath",
            CapabilityRequest::GetFileContent { .. } => "getFileContent",
            CapabilityRequest::ReadFile { .. } => "readFile",
            CapabilityRequest::WriteFile { .. } => "writeFile",
            CapabilityRequest::SetStatusBarMessage { .. } => "setStatusBarMessage",
            CapabilityRequest::ExecuteCommand { .. } => "executeCommand",
            CapabilityRequest::Subscribe { .. } => "subscribe",
        }
    }

    /// Permission string the manifest must declare for this request,
    /// or `None` for always-allowed operations
    pub fn required_permission(&self) -> Option<&'static str> {
        match self {
            CapabilityRequest::ReadFile { .. } | CapabilityRequest::GetFileContent { .. } => {
                Some("fs:read")
            }
            CapabilityRequest::WriteFile { .. } => Some("fs:write"),
            CapabilityRequest::Subscribe { .. } => Some("events"),
            CapabilityRequest::ExecuteCommand { .. } => Some("commands"),
            _ => None,
        }
    }
}

/// Messages delivered host -> context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum HostMessage {
    /// Triggers plugin bootstrap inside the context
    Activate,
    /// Routes a command invocation into the context
    #[serde(rename_all = "camelCase")]
    ExecuteCommand { command_id: String, args: Vec<Value> },
    /// Resolves a previously issued capability call
    #[serde(rename_all = "camelCase")]
    ApiResponse { call_id: u64, result: Value },
    /// Rejects a previously issued capability call
    #[serde(rename_all = "camelCase")]
    ApiError { call_id: u64, error: String },
    /// Delivers a subscribed editor event
    Event { event: EditorEvent },
    /// Orderly context teardown
    Shutdown,
}

/// Messages delivered context -> host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum PluginMessage {
    /// Announces a command id the context wants to handle
    #[serde(rename_all = "camelCase")]
    RegisterCommand { command_id: String },
    /// Requests a host capability, correlated by call id
    #[serde(rename_all = "camelCase")]
    ApiCall { call_id: u64, request: CapabilityRequest },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_shape() {
        let message = PluginMessage::ApiCall {
            call_id: 3,
            request: CapabilityRequest::ReadFile { path: "/tmp/a.txt".to_string() },
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], "apiCall");
        assert_eq!(value["data"]["callId"], 3);
        assert_eq!(value["data"]["request"]["method"], "readFile");
    }

    #[test]
    fn test_envelope_round_trip() {
        let message = HostMessage::ExecuteCommand {
            command_id: "hello.say".to_string(),
            args: vec![json!(1), json!("two")],
        };
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: HostMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            HostMessage::ExecuteCommand { command_id, args } => {
                assert_eq!(command_id, "hello.say");
                assert_eq!(args, vec![json!(1), json!("two")]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_event_names() {
        let event = EditorEvent::FileSaved { path: "/a".to_string() };
        assert_eq!(event.name(), "file:save");
        assert_eq!(event.kind(), EventKind::FileSave);
        assert_eq!(EventKind::from_event_name("file:change"), Some(EventKind::FileChange));
        assert_eq!(EventKind::from_event_name("file:rename"), None);
    }

    #[test]
    fn test_permission_mapping() {
        let read = CapabilityRequest::ReadFile { path: "/a".to_string() };
        assert_eq!(read.required_permission(), Some("fs:read"));

        let show = CapabilityRequest::ShowMessage {
            message: "hi".to_string(),
            severity: Severity::Info,
        };
        assert_eq!(show.required_permission(), None);

        let subscribe = CapabilityRequest::Subscribe { event: EventKind::FileOpen };
        assert_eq!(subscribe.required_permission(), Some("events"));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("warning"), Severity::Warning);
        assert_eq!(Severity::parse("error"), Severity::Error);
        assert_eq!(Severity::parse("anything"), Severity::Info);
        assert_eq!(Severity::Error.to_string(), "error");
    }
}
