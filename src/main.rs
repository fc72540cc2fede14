//! kvstate: host-side maintenance for kvstate partitions.
//!
//! ```text
//! kvstate [--config PATH] check    # validate the configuration
//! kvstate [--config PATH] sweep    # one sweep pass over every partition
//! kvstate [--config PATH] watch    # sweep on an interval until Ctrl-C
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use kvstate::{Config, RecordStore, Storage, Sweep, logging, spawn_sweeper};

#[derive(Parser, Debug)]
#[command(name = "kvstate")]
#[command(about = "Sweep expired records from kvstate partitions")]
#[command(version)]
struct Cli {
    /// Config file (default: $KVSTATE_HOME/kvstate.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print any warnings
    Check,
    /// Sweep every configured partition once and print the counts
    Sweep,
    /// Sweep every configured partition on the configured interval
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logging::init(&config.logging.level, config.logging.format);

    let validation = config.validate()?;
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Command::Check => check(&config),
        Command::Sweep => sweep(&config).await,
        Command::Watch => watch(&config).await,
    }
}

fn check(config: &Config) -> Result<()> {
    let path = config
        .storage
        .resolved_path()?
        .map_or_else(|| "-".to_string(), |p| p.display().to_string());

    println!("backend:     {}", config.storage.backend.as_str());
    println!("path:        {path}");
    println!("etag scheme: {:?}", config.storage.etag_scheme);
    println!("interval:    {}s", config.sweep.interval_secs);
    for partition in config.partitions() {
        println!("partition:   {partition}");
    }
    Ok(())
}

/// Stores for every configured partition. Values are opaque JSON here.
fn open_targets(config: &Config) -> Result<Vec<Arc<RecordStore<serde_json::Value>>>> {
    let storage = Storage::from_config(&config.storage).context("Failed to open storage")?;

    config
        .partitions()
        .into_iter()
        .map(|partition| {
            storage
                .open::<serde_json::Value>(partition.clone())
                .map(Arc::new)
                .with_context(|| format!("Invalid partition '{partition}'"))
        })
        .collect()
}

async fn sweep(config: &Config) -> Result<()> {
    let mut total = 0;
    let mut failed = 0;

    for store in open_targets(config)? {
        match store.sweep().await {
            Ok(removed) => {
                println!("{}: {removed} removed", store.partition());
                total += removed;
            },
            Err(e) => {
                eprintln!("{}: {e}", store.partition());
                failed += 1;
            },
        }
    }

    println!("total: {total} removed");
    if failed > 0 {
        anyhow::bail!("{failed} partition(s) failed to sweep");
    }
    Ok(())
}

async fn watch(config: &Config) -> Result<()> {
    let targets = open_targets(config)?
        .into_iter()
        .map(|store| store as Arc<dyn Sweep>)
        .collect();

    let cancel = spawn_sweeper(targets, config.sweep.sweeper());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    cancel.cancel();
    Ok(())
}
