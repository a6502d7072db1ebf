//! mide-host - Plugin host for the mide editor
//!
//! Discovers manifest-described plugins, runs each one in its own
//! isolation channel, and brokers capability calls between plugin
//! contexts and the editor workspace.

pub mod cli;
pub mod config;
pub mod logging;
pub mod plugin;
