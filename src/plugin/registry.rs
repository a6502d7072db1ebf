//! Command Registry
//!
//! Process-wide mapping from command id to handler, shared by host-native
//! code and plugin contexts. Registration is last-write-wins per id; every
//! entry is tagged with its owning plugin so unload can purge it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use log::debug;
use parking_lot::RwLock;
use serde_json::Value;

use crate::plugin::error::{HostError, HostResult};

/// Async command handler invoked with positional JSON arguments
pub type CommandHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, HostResult<Value>> + Send + Sync>;

/// Box an async closure into a [`CommandHandler`]
pub fn handler<F, Fut>(f: F) -> CommandHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HostResult<Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

struct CommandEntry {
    owner: Option<String>,
    handler: CommandHandler,
}

/// Registry of executable commands
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandEntry>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a command id.
    ///
    /// Overwrites any existing handler for the same id silently; `owner`
    /// tags the entry with the plugin id it belongs to (None for
    /// host-native commands).
    pub fn register(&self, command_id: &str, owner: Option<&str>, handler: CommandHandler) {
        let mut commands = self.commands.write();
        if commands.contains_key(command_id) {
            debug!("Command '{}' re-registered (last writer wins)", command_id);
        }
        commands.insert(
            command_id.to_string(),
            CommandEntry {
                owner: owner.map(|o| o.to_string()),
                handler,
            },
        );
    }

    /// Remove a single command; returns whether it existed
    pub fn unregister(&self, command_id: &str) -> bool {
        self.commands.write().remove(command_id).is_some()
    }

    /// Remove every command registered by a plugin; returns the purged ids
    pub fn purge_owner(&self, owner: &str) -> Vec<String> {
        let mut commands = self.commands.write();
        let purged: Vec<String> = commands
            .iter()
            .filter(|(_, entry)| entry.owner.as_deref() == Some(owner))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &purged {
            commands.remove(id);
        }
        purged
    }

    /// Execute a command, awaiting its handler and propagating the
    /// outcome verbatim
    pub async fn execute(&self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
        let handler = {
            let commands = self.commands.read();
            commands
                .get(command_id)
                .map(|entry| Arc::clone(&entry.handler))
        };
        match handler {
            Some(handler) => handler(args).await,
            None => Err(HostError::command_not_found(command_id)),
        }
    }

    pub fn contains(&self, command_id: &str) -> bool {
        self.commands.read().contains_key(command_id)
    }

    /// Owning plugin id for a command, if any
    pub fn owner_of(&self, command_id: &str) -> Option<String> {
        self.commands
            .read()
            .get(command_id)
            .and_then(|entry| entry.owner.clone())
    }

    pub fn list_commands(&self) -> Vec<String> {
        self.commands.read().keys().cloned().collect()
    }

    pub fn command_count(&self) -> usize {
        self.commands.read().len()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
