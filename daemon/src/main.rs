//! Helix daemon: entry point for running a consensus node.

use anyhow::Context;
use clap::Parser;
use helix_node::{init_logging, HelixNode, NodeConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helix-daemon", about = "Helix hybrid consensus node daemon")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "HELIX_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "HELIX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output: "human" or "json".
    #[arg(long, env = "HELIX_LOG_FORMAT")]
    log_format: Option<String>,

    /// Shard this node registers its chain under.
    #[arg(long, env = "HELIX_SHARD_ID")]
    shard_id: Option<u32>,

    /// Disable Prometheus metrics collection.
    #[arg(long, env = "HELIX_DISABLE_METRICS")]
    disable_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the node and run until SIGINT/SIGTERM.
    Run,
    /// Print the effective configuration as TOML and exit.
    Config,
}

fn load_config(cli: &Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_string_lossy();
            NodeConfig::from_toml_file(&path)
                .with_context(|| format!("loading config from {path}"))?
        }
        None => NodeConfig::default(),
    };

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = format.clone();
    }
    if let Some(shard) = cli.shard_id {
        config.shard_id = shard;
    }
    if cli.disable_metrics {
        config.enable_metrics = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string());
        }
        Command::Run => {
            init_logging(config.log_format()?, &config.log_level);
            tracing::info!(
                shard = config.shard_id,
                cycle_ms = config.cycle_interval_ms,
                metrics = config.enable_metrics,
                encrypted_ledger = config.encrypt_ledger,
                "starting helix node"
            );

            let mut node = HelixNode::new(config).context("building node")?;
            node.start().await?;
            tracing::info!(tasks = ?node.task_names(), "node running");

            node.shutdown.wait_for_signal().await;
            tracing::info!("shutdown signal received, stopping node");
            node.stop().await?;

            tracing::info!("helix daemon exited cleanly");
        }
    }

    Ok(())
}
