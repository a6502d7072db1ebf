//! Lua Execution Context
//!
//! Runs an interpreted plugin's script inside a sandboxed Lua state on a
//! dedicated OS thread. The sandbox strips filesystem, process, and
//! dynamic-loading globals and caps memory, so the only way out is the
//! `mide` api table installed at activation. Capability calls block the
//! Lua thread on the async bridge via the runtime handle; the channel's
//! router keeps resolving replies concurrently, so this never deadlocks.

use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use log::{debug, warn};
use mlua::{Function, Lua, LuaSerdeExt, Table, Value as LuaValue, Variadic};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::plugin::bridge::ExtensionApi;
use crate::plugin::error::{HostError, HostResult};
use crate::plugin::protocol::{EditorEvent, EventKind, Severity};
use crate::plugin::traits::ExtensionProgram;

/// Memory ceiling for a plugin's Lua state
const LUA_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Registry key for the command-handler table
const COMMANDS_KEY: &str = "mide_commands";
/// Registry key for the event-callback table
const EVENTS_KEY: &str = "mide_events";

enum LuaInvocation {
    Activate {
        api: ExtensionApi,
        reply: oneshot::Sender<HostResult<()>>,
    },
    Command {
        command_id: String,
        args: Vec<Value>,
        reply: oneshot::Sender<HostResult<Value>>,
    },
    Event {
        event: EditorEvent,
        reply: oneshot::Sender<HostResult<()>>,
    },
    Shutdown,
}

/// Interpreted plugin program backed by a sandboxed Lua thread
#[derive(Debug)]
pub struct LuaProgram {
    plugin_id: String,
    invoke_tx: UnboundedSender<LuaInvocation>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LuaProgram {
    /// Load a script into a fresh sandbox.
    ///
    /// The script's top level is executed during load; a parse or
    /// runtime fault there fails construction before any host state is
    /// touched.
    pub fn load(plugin_id: &str, source: String) -> HostResult<Self> {
        let runtime = Handle::current();
        let (invoke_tx, invoke_rx) = tokio::sync::mpsc::unbounded_channel::<LuaInvocation>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<HostResult<()>>();

        let id = plugin_id.to_string();
        let thread = thread::Builder::new()
            .name(format!("plugin-{}", plugin_id))
            .spawn(move || lua_thread_main(id, source, runtime, invoke_rx, ready_tx))
            .map_err(|e| {
                HostError::channel_construction_failed(format!("failed to spawn plugin thread: {}", e))
            })?;

        // Startup handshake: the thread reports whether the script loaded
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                plugin_id: plugin_id.to_string(),
                invoke_tx,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(HostError::channel_construction_failed(
                    "plugin thread exited before reporting readiness",
                ))
            }
        }
    }

    fn dispatch<'a, T: 'a>(
        &'a self,
        invocation: LuaInvocation,
        reply_rx: oneshot::Receiver<HostResult<T>>,
    ) -> impl std::future::Future<Output = HostResult<T>> + 'a {
        let sent = self.invoke_tx.send(invocation).is_ok();
        async move {
            if !sent {
                return Err(HostError::channel_closed(&self.plugin_id));
            }
            reply_rx
                .await
                .map_err(|_| HostError::channel_closed(&self.plugin_id))?
        }
    }
}

#[async_trait]
impl ExtensionProgram for LuaProgram {
    async fn activate(&mut self, api: ExtensionApi) -> HostResult<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.dispatch(LuaInvocation::Activate { api, reply }, reply_rx).await
    }

    async fn execute_command(&mut self, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
        let (reply, reply_rx) = oneshot::channel();
        self.dispatch(
            LuaInvocation::Command {
                command_id: command_id.to_string(),
                args,
                reply,
            },
            reply_rx,
        )
        .await
    }

    async fn handle_event(&mut self, event: EditorEvent) -> HostResult<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.dispatch(LuaInvocation::Event { event, reply }, reply_rx).await
    }

    async fn deactivate(&mut self) -> HostResult<()> {
        if self.invoke_tx.send(LuaInvocation::Shutdown).is_err() {
            debug!("Lua thread for '{}' already gone at deactivate", self.plugin_id);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Lua thread for '{}' panicked", self.plugin_id);
            }
        }
        Ok(())
    }
}

impl Drop for LuaProgram {
    fn drop(&mut self) {
        let _ = self.invoke_tx.send(LuaInvocation::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn lua_thread_main(
    plugin_id: String,
    source: String,
    runtime: Handle,
    mut invoke_rx: UnboundedReceiver<LuaInvocation>,
    ready_tx: std_mpsc::Sender<HostResult<()>>,
) {
    let lua = match build_sandbox(&plugin_id, &source) {
        Ok(lua) => {
            let _ = ready_tx.send(Ok(()));
            lua
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while let Some(invocation) = invoke_rx.blocking_recv() {
        match invocation {
            LuaInvocation::Activate { api, reply } => {
                let result = run_activate(&lua, &runtime, api);
                let _ = reply.send(result);
            }
            LuaInvocation::Command { command_id, args, reply } => {
                let result = dispatch_command(&lua, &command_id, args);
                let _ = reply.send(result);
            }
            LuaInvocation::Event { event, reply } => {
                let result = dispatch_event(&lua, &event);
                let _ = reply.send(result);
            }
            LuaInvocation::Shutdown => break,
        }
    }

    if let Ok(Some(deactivate)) = lua.globals().get::<Option<Function>>("deactivate") {
        if let Err(e) = deactivate.call::<()>(()) {
            warn!("Lua deactivate in '{}' failed: {}", plugin_id, e);
        }
    }
    debug!("Lua thread for '{}' exiting", plugin_id);
}

/// Create the sandboxed state and run the script's top level
fn build_sandbox(plugin_id: &str, source: &str) -> HostResult<Lua> {
    let lua = Lua::new();
    lua.set_memory_limit(LUA_MEMORY_LIMIT)?;

    let globals = lua.globals();
    for name in [
        "io",
        "os",
        "debug",
        "package",
        "require",
        "load",
        "loadfile",
        "dofile",
        "loadstring",
        "collectgarbage",
    ] {
        globals.set(name, LuaValue::Nil)?;
    }

    lua.set_named_registry_value(COMMANDS_KEY, lua.create_table()?)?;
    lua.set_named_registry_value(EVENTS_KEY, lua.create_table()?)?;

    lua.load(source)
        .set_name(format!("plugin:{}", plugin_id))
        .exec()
        .map_err(|e| HostError::channel_construction_failed(format!("script load failed: {}", e)))?;

    Ok(lua)
}

fn run_activate(lua: &Lua, runtime: &Handle, api: ExtensionApi) -> HostResult<()> {
    install_api(lua, runtime, api)?;
    if let Some(activate) = lua.globals().get::<Option<Function>>("activate")? {
        activate.call::<()>(())?;
    }
    Ok(())
}

/// Install the `mide` global table the script uses to reach the host
fn install_api(lua: &Lua, runtime: &Handle, api: ExtensionApi) -> HostResult<()> {
    let mide = lua.create_table()?;

    {
        let api = api.clone();
        mide.set(
            "register_command",
            lua.create_function(move |lua, (command_id, handler): (String, Function)| {
                let commands: Table = lua.named_registry_value(COMMANDS_KEY)?;
                commands.set(command_id.as_str(), handler)?;
                api.register_command(&command_id).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "show_message",
            lua.create_function(move |_, (message, severity): (String, Option<String>)| {
                let severity = Severity::parse(severity.as_deref().unwrap_or("info"));
                rt.block_on(api.show_message(severity, &message))
                    .map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "get_active_file",
            lua.create_function(move |_, ()| {
                rt.block_on(api.get_active_file()).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "get_open_files",
            lua.create_function(move |_, ()| {
                rt.block_on(api.get_open_files()).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "get_workspace_path",
            lua.create_function(move |_, ()| {
                rt.block_on(api.get_workspace_path()).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "get_file_content",
            lua.create_function(move |_, path: String| {
                rt.block_on(api.get_file_content(&path)).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "read_file",
            lua.create_function(move |_, path: String| {
                rt.block_on(api.read_file(&path)).map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "write_file",
            lua.create_function(move |_, (path, content): (String, String)| {
                rt.block_on(api.write_file(&path, &content))
                    .map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "set_status_bar_message",
            lua.create_function(move |_, (message, timeout_ms): (String, Option<u64>)| {
                rt.block_on(api.set_status_bar_message(&message, timeout_ms))
                    .map_err(mlua::Error::external)
            })?,
        )?;
    }

    {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            "execute_command",
            lua.create_function(move |lua, (command_id, args): (String, Variadic<LuaValue>)| {
                let args = args
                    .into_iter()
                    .map(|v| lua.from_value(v))
                    .collect::<mlua::Result<Vec<Value>>>()?;
                let result = rt
                    .block_on(api.execute_command(&command_id, args))
                    .map_err(mlua::Error::external)?;
                lua.to_value(&result)
            })?,
        )?;
    }

    for (name, kind) in [
        ("on_file_open", EventKind::FileOpen),
        ("on_file_save", EventKind::FileSave),
        ("on_file_change", EventKind::FileChange),
    ] {
        let api = api.clone();
        let rt = runtime.clone();
        mide.set(
            name,
            lua.create_function(move |lua, callback: Function| {
                let events: Table = lua.named_registry_value(EVENTS_KEY)?;
                events.set(kind.event_name(), callback)?;
                rt.block_on(api.subscribe(kind)).map_err(mlua::Error::external)
            })?,
        )?;
    }

    lua.globals().set("mide", mide)?;
    Ok(())
}

/// Invoke a registered handler, falling back to a global
/// `execute_command(id, ...)` function for scripts that dispatch manually
fn dispatch_command(lua: &Lua, command_id: &str, args: Vec<Value>) -> HostResult<Value> {
    let lua_args = args
        .iter()
        .map(|v| lua.to_value(v))
        .collect::<mlua::Result<Vec<LuaValue>>>()?;

    let commands: Table = lua.named_registry_value(COMMANDS_KEY)?;
    let result = if let Some(handler) = commands.get::<Option<Function>>(command_id)? {
        handler.call::<LuaValue>(Variadic::from_iter(lua_args))?
    } else if let Some(fallback) = lua.globals().get::<Option<Function>>("execute_command")? {
        let mut full_args = vec![lua.to_value(command_id)?];
        full_args.extend(lua_args);
        fallback.call::<LuaValue>(Variadic::from_iter(full_args))?
    } else {
        return Err(HostError::command_not_found(command_id));
    };

    Ok(lua.from_value(result)?)
}

/// Deliver an event to its stored callback, if any. A callback fault is
/// reported as a delivery failure; the subscription stays live and the
/// worker contains the error.
fn dispatch_event(lua: &Lua, event: &EditorEvent) -> HostResult<()> {
    let events: Table = lua.named_registry_value(EVENTS_KEY)?;
    let Some(callback) = events.get::<Option<Function>>(event.name())? else {
        return Ok(());
    };
    let result = match event {
        EditorEvent::FileOpened { path } | EditorEvent::FileSaved { path } => {
            callback.call::<()>(path.as_str())
        }
        EditorEvent::FileChanged { path, content } => {
            callback.call::<()>((path.as_str(), content.as_str()))
        }
    };
    result.map_err(|e| {
        HostError::event_delivery_failed(format!("{} callback: {}", event.name(), e))
    })
}
