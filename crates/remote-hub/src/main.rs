//! `remote-hub` administration tool.
//!
//! Works on the configuration and learned-code documents directly, without a
//! host connection:
//!
//! ```text
//! remote-hub check                                   validate every remote
//! remote-hub list   --remote TV [--device tv]        print learned commands
//! remote-hub delete --remote TV --device tv power    delete learned commands
//! ```
//!
//! Deletes take the same document lock and load-mutate-save path the running
//! hub uses.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use remote_core::CommandList;
use remote_hub::application::manage_commands;
use remote_hub::application::remote_entity::store_for;
use remote_hub::infrastructure::storage::{
    default_config_path, load_config, CodeStore, HubConfig, JsonCodeStore, StoreLocks,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Universal remote hub administration.
#[derive(Debug, Parser)]
#[command(
    name = "remote-hub",
    about = "Inspect and maintain universal remote configuration and learned codes",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Defaults to the platform config directory.
    #[arg(long, env = "REMOTE_HUB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate every configured remote.
    Check,
    /// Print learned commands of a remote.
    List {
        #[arg(long)]
        remote: String,
        /// Only this device; all devices when omitted.
        #[arg(long)]
        device: Option<String>,
    },
    /// Delete learned commands from a device.
    Delete {
        #[arg(long)]
        remote: String,
        #[arg(long)]
        device: String,
        #[arg(required = true)]
        commands: Vec<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.hub.log_level)),
        )
        .init();

    match cli.command {
        Command::Check => check(&config),
        Command::List { remote, device } => list(&config, &remote, device.as_deref()).await,
        Command::Delete {
            remote,
            device,
            commands,
        } => delete(&config, &remote, &device, commands).await,
    }
}

fn check(config: &HubConfig) -> anyhow::Result<()> {
    let mut invalid = 0usize;
    for remote in &config.remotes {
        match remote.validate() {
            Ok(settings) => println!(
                "ok       {:<24} {:<8} store universal_remote_{}.json",
                remote.name,
                settings.kind(),
                settings.identity()
            ),
            Err(e) => {
                invalid += 1;
                println!("invalid  {:<24} {e}", remote.name);
            }
        }
    }

    info!(
        remotes = config.remotes.len(),
        invalid, "configuration checked"
    );
    if invalid > 0 {
        return Err(anyhow!("{invalid} remote(s) have an invalid configuration"));
    }
    Ok(())
}

async fn list(config: &HubConfig, remote: &str, device: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(config, remote)?;
    let library = store.load().await?;

    let devices: Vec<&str> = match device {
        Some(device) => vec![device],
        None => library.devices().collect(),
    };
    if devices.is_empty() {
        println!("no learned commands");
    }
    for device in devices {
        println!("{device}:");
        for command in library.commands(device) {
            println!("  {command}");
        }
    }
    Ok(())
}

async fn delete(
    config: &HubConfig,
    remote: &str,
    device: &str,
    commands: Vec<String>,
) -> anyhow::Result<()> {
    let store = open_store(config, remote)?;
    let commands = CommandList::new(commands)?;

    let report = manage_commands::delete_commands(&store, device.trim(), &commands).await?;
    for name in &report.removed {
        println!("deleted  {name}");
    }
    for name in &report.missing {
        println!("missing  {name}");
    }
    if report.removed.is_empty() {
        warn!(device, "nothing deleted");
    }
    Ok(())
}

fn open_store(
    config: &HubConfig,
    remote: &str,
) -> anyhow::Result<JsonCodeStore> {
    let remote_config = config
        .remote(remote)
        .ok_or_else(|| anyhow!("no remote named '{remote}' in the configuration"))?;
    Ok(store_for(
        remote_config,
        &config.hub.storage_dir,
        &StoreLocks::new(),
    )?)
}
