//! Command Line Interface
//!
//! Argument parsing for the standalone plugin host binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mide-host")]
#[command(about = "Plugin host for the mide editor")]
#[command(version)]
pub struct Args {
    /// Path to a configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Plugin directory (overrides configuration)
    #[arg(long, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Console log level (error, warn, info, debug, trace, off)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path; enables file logging at debug level
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log output format (text, json)
    #[arg(long, default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List installed plugins
    List,
    /// Browse the marketplace feed
    Marketplace {
        /// Filter entries by a search query
        query: Option<String>,
    },
    /// Install a plugin from a local package directory
    Install {
        /// Package directory path
        source: String,
        /// Plugin id to install under
        id: String,
    },
    /// Uninstall an installed plugin
    Uninstall {
        /// Plugin id
        id: String,
    },
    /// Load a plugin and optionally run one of its commands
    Run {
        /// Plugin id
        id: String,
        /// Command id to execute after activation
        #[arg(long)]
        command: Option<String>,
        /// JSON arguments for the command
        #[arg(long, value_name = "JSON")]
        args: Vec<String>,
    },
}
