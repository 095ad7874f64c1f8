//! appwatchd — exports per-instance metrics for every running workload.
//!
//! Polls the platform inventory, keeps one watcher per running workload,
//! and serves the resulting metrics on `/metrics`.
//!
//! # Usage
//!
//! ```text
//! appwatchd --config /etc/appwatch/appwatchd.toml --listen 0.0.0.0:9090
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use appwatch_discovery::Discovery;
use appwatchd::{Config, HttpInventoryClient, HttpStreamConnector, LogFormat, build_router};

const DEFAULT_FILTER: &str = "info,appwatchd=debug,appwatch=debug";

#[derive(Parser)]
#[command(name = "appwatchd", about = "Workload metrics exporter", version)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to serve /metrics on (overrides the config file).
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Inventory poll interval, e.g. "30s" (overrides the config file).
    #[arg(long)]
    poll_interval: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.listen, cli.poll_interval);
    init_tracing(config.log_format);
    config.validate()?;

    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("appwatchd starting");

    let poll_interval = config.poll_interval()?;
    let inventory = HttpInventoryClient::new(config.inventory_uri()?);
    let connector = HttpStreamConnector::new(config.stream.url.clone());
    let registry = Registry::new();

    let discovery = Discovery::new(inventory, connector, registry.clone(), poll_interval)
        .with_control_buffer(config.discovery.watcher_buffer);
    info!(
        inventory = %config.inventory.url,
        stream = %config.stream.url,
        "discovery initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    let mut discovery_handle = tokio::spawn(discovery.run(shutdown_rx));

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(addr = %config.server.listen, "metrics server starting");

    let server = axum::serve(listener, build_router(registry)).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server_handle = tokio::spawn(async move { server.await });

    // ── Wait for Ctrl-C or a fatal discovery error ─────────────

    let discovery_result = tokio::select! {
        joined = &mut discovery_handle => joined,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to install Ctrl-C handler")?;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            discovery_handle.await
        }
    };

    // Stop the server whichever way discovery ended.
    let _ = shutdown_tx.send(true);
    server_handle
        .await
        .context("metrics server task panicked")?
        .context("metrics server failed")?;

    match discovery_result.context("discovery task panicked")? {
        Ok(()) => {
            info!("appwatchd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "discovery stopped with a fatal error");
            Err(e.into())
        }
    }
}
