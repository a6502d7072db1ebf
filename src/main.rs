use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::error;

use mide_host::cli::{Args, Command};
use mide_host::config::HostConfig;
use mide_host::logging::{init_logger, parse_log_level, LogConfig, LogDestination, LogFormat};
use mide_host::plugin::{EditorWorkspace, MarketplaceCatalog, PluginManager};

fn main() {
    let args = Args::parse();

    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    // Plugin threads re-enter the runtime via Handle::block_on, which
    // needs worker threads to make progress while one blocks.
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(args)) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn setup_logging(args: &Args) -> Result<()> {
    let console_level = parse_log_level(&args.log_level)?;
    let format: LogFormat = args
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let (file_level, destination) = match &args.log_file {
        Some(path) => (
            Some(log::LevelFilter::Debug),
            LogDestination::Both(path.clone()),
        ),
        None => (None, LogDestination::Console),
    };
    init_logger(LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

async fn run(args: Args) -> Result<()> {
    let mut config = HostConfig::load(args.config.as_deref())?;
    if let Some(plugin_dir) = &args.plugin_dir {
        config.plugin_dir = plugin_dir.clone();
    }

    match args.command {
        Command::List => list_plugins(&config).await,
        Command::Marketplace { query } => browse_marketplace(&config, query.as_deref()).await,
        Command::Install { source, id } => install_plugin(&config, &source, &id).await,
        Command::Uninstall { id } => uninstall_plugin(&config, &id).await,
        Command::Run { id, command, args } => run_plugin(&config, &id, command.as_deref(), &args).await,
    }
}

fn build_manager(config: &HostConfig) -> PluginManager {
    let workspace = EditorWorkspace::shared();
    PluginManager::new(&config.plugin_dir, workspace, config.enforce_permissions)
}

async fn list_plugins(config: &HostConfig) -> Result<()> {
    let manager = build_manager(config);
    let manifests = manager.discover().await?;
    if manifests.is_empty() {
        println!("No plugins installed in {}", config.plugin_dir.display());
        return Ok(());
    }
    for manifest in manifests {
        let description = manifest.description.as_deref().unwrap_or("");
        println!("{:<24} {:<10} {}", manifest.id, manifest.version, description);
    }
    Ok(())
}

async fn browse_marketplace(config: &HostConfig, query: Option<&str>) -> Result<()> {
    let feed = config
        .marketplace_feed
        .as_ref()
        .context("No marketplace feed configured (set `marketplace_feed` in the config file)")?;
    let catalog = MarketplaceCatalog::load(feed).await?;
    let entries: Vec<_> = match query {
        Some(query) => catalog.search(query),
        None => catalog.entries().iter().collect(),
    };
    if entries.is_empty() {
        println!("No matching plugins");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<24} {:<10} {:>8} downloads  {:.1}★  {}",
            entry.id, entry.version, entry.downloads, entry.rating, entry.description
        );
    }
    Ok(())
}

async fn install_plugin(config: &HostConfig, source: &str, id: &str) -> Result<()> {
    let manager = build_manager(config);
    manager.discover().await?;
    let manifest = manager.install(source, id).await?;
    println!("Installed {} v{}", manifest.id, manifest.version);
    Ok(())
}

async fn uninstall_plugin(config: &HostConfig, id: &str) -> Result<()> {
    let manager = build_manager(config);
    manager.discover().await?;
    manager.uninstall(id).await?;
    println!("Uninstalled {}", id);
    Ok(())
}

async fn run_plugin(
    config: &HostConfig,
    id: &str,
    command: Option<&str>,
    raw_args: &[String],
) -> Result<()> {
    let workspace = EditorWorkspace::shared();
    let manager = PluginManager::new(
        PathBuf::from(&config.plugin_dir),
        workspace.clone(),
        config.enforce_permissions,
    );
    manager.discover().await?;
    manager.enable(id).await?;

    if let Some(command_id) = command {
        let args = raw_args
            .iter()
            .map(|raw| serde_json::from_str(raw).with_context(|| format!("Invalid JSON argument: {}", raw)))
            .collect::<Result<Vec<serde_json::Value>>>()?;
        manager.execute_command(command_id, args).await?;
        // Give the plugin's fire-and-forget command a moment to run
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    manager.shutdown().await;

    for (severity, message) in workspace.notifications() {
        println!("[{}] {}", severity, message);
    }
    if let Some(status) = workspace.status_bar_message() {
        println!("status: {}", status);
    }
    Ok(())
}
