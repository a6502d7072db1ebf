//! Mock extension programs for testing

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::plugin::bridge::ExtensionApi;
use crate::plugin::error::{HostError, HostResult};
use crate::plugin::protocol::EditorEvent;
use crate::plugin::traits::ExtensionProgram;

/// Shared journal of everything a mock program was asked to do
#[derive(Default)]
pub struct ProgramJournal {
    pub activations: usize,
    pub commands: Vec<(String, Vec<Value>)>,
    pub events: Vec<String>,
    pub deactivations: usize,
}

pub type SharedJournal = Arc<Mutex<ProgramJournal>>;

pub fn new_journal() -> SharedJournal {
    Arc::new(Mutex::new(ProgramJournal::default()))
}

/// Registers a fixed set of commands at activation and echoes its
/// arguments back through the journal
pub struct EchoProgram {
    pub command_ids: Vec<String>,
    pub journal: SharedJournal,
}

impl EchoProgram {
    pub fn new(command_ids: &[&str], journal: SharedJournal) -> Self {
        Self {
            command_ids: command_ids.iter().map(|s| s.to_string()).collect(),
            journal,
        }
    }
}

#[async_trait]
impl ExtensionProgram for EchoProgram {
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
        for command_id in &self.command_ids {
            api.register_command(command_id)?;
        }
        self.journal.lock().activations += 1;
        Ok(())
    }

    async fn execute_command(&mut self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
        self.journal.lock().commands.push((command_id.to_string(), args.clone()));
        Ok(json!({ "echo": args }))
    }

    async fn handle_event(&mut self, event: EditorEvent) -> HostResult<()> {
        self.journal.lock().events.push(event.name().to_string());
        Ok(())
    }

    async fn deactivate(&mut self) -> HostResult<()> {
        self.journal.lock().deactivations += 1;
        Ok(())
    }
}

/// Subscribes to file saves at activation and records deliveries
pub struct SaveWatcherProgram {
    pub journal: SharedJournal,
}

#[async_trait]
impl ExtensionProgram for SaveWatcherProgram {
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
        api.on_file_save().await?;
        self.journal.lock().activations += 1;
        Ok(())
    }

    async fn execute_command(&mut self, _command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
        Ok(Value::Null)
    }

    async fn handle_event(&mut self, event: EditorEvent) -> HostResult<()> {
        self.journal.lock().events.push(event.path().to_string());
        Ok(())
    }

    async fn deactivate(&mut self) -> HostResult<()> {
        self.journal.lock().deactivations += 1;
        Ok(())
    }
}

/// Registers one command and fails every invocation of it, to exercise
/// fault containment
pub struct FailingProgram {
    pub command_id: String,
}

#[async_trait]
impl ExtensionProgram for FailingProgram {
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
        api.register_command(&self.command_id)
    }

    async fn execute_command(&mut self, command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
        Err(HostError::generic(format!("mock failure in {}", command_id)))
    }
}

/// Issues one capability call at activation and journals the outcome
pub struct ProbeProgram {
    pub journal: SharedJournal,
}

#[async_trait]
impl ExtensionProgram for ProbeProgram {
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
        match api.read_file("/probe/target.txt").await {
            Ok(content) => self.journal.lock().events.push(format!("read:{}", content)),
            Err(e) => self.journal.lock().events.push(format!("error:{}", e)),
        }
        self.journal.lock().activations += 1;
        Ok(())
    }

    async fn execute_command(&mut self, _command_id: &str, _args: Vec<Value>) -> HostResult<Value> {
        Ok(Value::Null)
    }
}
