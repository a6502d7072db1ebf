//! Workspace Services
//!
//! Editor-side state the capability bridge reads and mutates on behalf of
//! plugins. The trait seam exists so tests and embedders can substitute
//! their own editor state; [`EditorWorkspace`] is the standalone
//! implementation backed by the filesystem plus an in-memory open-file
//! table.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;

use crate::plugin::error::{HostError, HostResult};
use crate::plugin::protocol::Severity;

/// A file currently open in the editor
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: String,
    pub content: String,
}

/// Editor state surface consumed by the capability bridge
#[async_trait]
pub trait WorkspaceServices: Send + Sync {
    /// Path of the file with focus, if any
    fn active_file(&self) -> Option<String>;

    /// Paths of every open file
    fn open_files(&self) -> Vec<String>;

    /// Workspace root, if one is open
    fn workspace_path(&self) -> Option<String>;

    /// In-memory content of an open file; `None` when the file is not open
    fn file_content(&self, path: &str) -> Option<String>;

    /// Read a file from disk
    async fn read_file(&self, path: &str) -> HostResult<String>;

    /// Write a file to disk
    async fn write_file(&self, path: &str, content: &str) -> HostResult<()>;

    /// Surface a notification to the user
    fn show_message(&self, severity: Severity, message: &str);

    /// Replace the status bar text
    fn set_status_bar_message(&self, message: &str, timeout_ms: Option<u64>);
}

#[derive(Default)]
struct WorkspaceState {
    workspace_path: Option<PathBuf>,
    active_file: Option<String>,
    open_files: Vec<OpenFile>,
    notifications: Vec<(Severity, String)>,
    status_bar: Option<String>,
}

/// Standalone workspace backed by the filesystem and an open-file table
pub struct EditorWorkspace {
    state: Mutex<WorkspaceState>,
}

impl EditorWorkspace {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkspaceState::default()),
        }
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        let workspace = Self::new();
        workspace.state.lock().workspace_path = Some(root.into());
        workspace
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open a file in the editor and make it active
    pub fn open_file(&self, path: &str, content: &str) {
        let mut state = self.state.lock();
        if let Some(existing) = state.open_files.iter_mut().find(|f| f.path == path) {
            existing.content = content.to_string();
        } else {
            state.open_files.push(OpenFile {
                path: path.to_string(),
                content: content.to_string(),
            });
        }
        state.active_file = Some(path.to_string());
    }

    pub fn close_file(&self, path: &str) {
        let mut state = self.state.lock();
        state.open_files.retain(|f| f.path != path);
        if state.active_file.as_deref() == Some(path) {
            state.active_file = state.open_files.last().map(|f| f.path.clone());
        }
    }

    pub fn set_active_file(&self, path: Option<&str>) {
        self.state.lock().active_file = path.map(|p| p.to_string());
    }

    /// Notifications accumulated since construction, oldest first
    pub fn notifications(&self) -> Vec<(Severity, String)> {
        self.state.lock().notifications.clone()
    }

    pub fn status_bar_message(&self) -> Option<String> {
        self.state.lock().status_bar.clone()
    }
}

impl Default for EditorWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkspaceServices for EditorWorkspace {
    fn active_file(&self) -> Option<String> {
        self.state.lock().active_file.clone()
    }

    fn open_files(&self) -> Vec<String> {
        self.state.lock().open_files.iter().map(|f| f.path.clone()).collect()
    }

    fn workspace_path(&self) -> Option<String> {
        self.state
            .lock()
            .workspace_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn file_content(&self, path: &str) -> Option<String> {
        self.state
            .lock()
            .open_files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.clone())
    }

    async fn read_file(&self, path: &str) -> HostResult<String> {
        // The open-file table wins over disk so unsaved edits are visible
        if let Some(content) = self.file_content(path) {
            return Ok(content);
        }
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostError::file_read(path, e.to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> HostResult<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| HostError::file_write(path, e.to_string()))?;
        let mut state = self.state.lock();
        if let Some(open) = state.open_files.iter_mut().find(|f| f.path == path) {
            open.content = content.to_string();
        }
        Ok(())
    }

    fn show_message(&self, severity: Severity, message: &str) {
        info!("[notification:{}] {}", severity, message);
        self.state.lock().notifications.push((severity, message.to_string()));
    }

    fn set_status_bar_message(&self, message: &str, _timeout_ms: Option<u64>) {
        self.state.lock().status_bar = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_tracking() {
        let workspace = EditorWorkspace::new();
        assert!(workspace.active_file().is_none());

        workspace.open_file("/w/a.rs", "fn a() {}");
        workspace.open_file("/w/b.rs", "fn b() {}");
        assert_eq!(workspace.active_file().as_deref(), Some("/w/b.rs"));
        assert_eq!(workspace.open_files(), vec!["/w/a.rs", "/w/b.rs"]);

        workspace.close_file("/w/b.rs");
        assert_eq!(workspace.active_file().as_deref(), Some("/w/a.rs"));
    }

    #[test]
    fn test_reopen_updates_content() {
        let workspace = EditorWorkspace::new();
        workspace.open_file("/w/a.rs", "v1");
        workspace.open_file("/w/a.rs", "v2");
        assert_eq!(workspace.open_files().len(), 1);
        assert_eq!(workspace.file_content("/w/a.rs").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_read_prefers_open_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        tokio::fs::write(&path, "on disk").await.unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let workspace = EditorWorkspace::new();
        assert_eq!(workspace.read_file(&path_str).await.unwrap(), "on disk");

        workspace.open_file(&path_str, "unsaved edit");
        assert_eq!(workspace.read_file(&path_str).await.unwrap(), "unsaved edit");
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let workspace = EditorWorkspace::new();
        let err = workspace.read_file("/nonexistent/nope.txt").await.unwrap_err();
        assert!(matches!(err, HostError::FileRead { .. }));
    }

    #[tokio::test]
    async fn test_write_updates_disk_and_open_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.txt");
        let path_str = path.to_string_lossy().into_owned();

        let workspace = EditorWorkspace::new();
        workspace.open_file(&path_str, "old");
        workspace.write_file(&path_str, "new").await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "new");
        assert_eq!(workspace.file_content(&path_str).as_deref(), Some("new"));
    }

    #[test]
    fn test_notifications_and_status_bar() {
        let workspace = EditorWorkspace::with_root("/w");
        workspace.show_message(Severity::Warning, "careful");
        workspace.set_status_bar_message("ready", Some(5000));

        assert_eq!(workspace.workspace_path().as_deref(), Some("/w"));
        assert_eq!(workspace.notifications(), vec![(Severity::Warning, "careful".to_string())]);
        assert_eq!(workspace.status_bar_message().as_deref(), Some("ready"));
    }
}
