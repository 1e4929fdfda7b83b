use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use netpulse::api;
use netpulse::config;
use netpulse::scheduler::Scheduler;
use netpulse::CheckStore;

#[derive(Debug, Parser)]
#[command(name = "netpulse", version, about = "Ping and HTTP health checker")]
struct Cli {
    /// Config file (.yaml, .yml, .toml or .json); edits are written back to it
    #[arg(short, long, env = "NETPULSE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
    /// Seconds between sweeps, overrides check_interval
    #[arg(short, long)]
    interval: Option<u64>,
    /// API port, overrides api_port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config = config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let interval = Duration::from_secs(cli.interval.unwrap_or(config.check_interval));
    let api_port = cli.port.unwrap_or(config.api_port);
    info!(hosts = config.hosts.len(), path = %cli.config.display(), "Config loaded");

    let store = Arc::new(
        CheckStore::new(config)
            .context("Failed to build check store")?
            .with_config_path(&cli.config),
    );

    let scheduler = Scheduler::new(Arc::clone(&store), interval)
        .start()
        .context("Failed to start scheduler")?;

    let shutdown = CancellationToken::new();
    let server = {
        let store = Arc::clone(&store);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(api_port, store, shutdown).await {
                tracing::error!("API server failed: {:#}", e);
            }
        })
    };

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Closing NetPulse...");

    shutdown.cancel();
    scheduler.shutdown().await;
    let _ = server.await;

    Ok(())
}
