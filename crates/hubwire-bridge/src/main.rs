//! # hubwire
//!
//! Bridges a home-automation device hub to smart-home accessories.
//!
//! ## Usage
//!
//! ```bash
//! # Run with settings from ./hubwire.toml or defaults
//! hubwire
//!
//! # Run with a specific config file
//! hubwire --config /path/to/hubwire.toml
//!
//! # Point at a hub with environment variables
//! HUBWIRE_HOST=192.168.1.40 HUBWIRE_PORT=50005 hubwire
//! ```

mod config;
mod devices;
mod hub;
mod metrics;

use anyhow::{bail, Context, Result};
use hubwire_transport::TcpConnector;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubwire=info,hubwire_core=info,hubwire_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path_arg(std::env::args().skip(1))?;
    let config = config::Config::load(config_path.as_deref())?;

    tracing::info!("Starting hubwire bridge for {}:{}", config.host, config.port);

    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let hub = hub::Hub::new(config.connection_config(), TcpConnector::shared());
    let _state_tracker = metrics::track_connection(hub.connection());
    let mirrors = devices::register_devices(&hub, &config.devices());
    tracing::info!(devices = mirrors.len(), "Devices registered");

    hub.start().context("Failed to start hub connection")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    hub.shutdown().await;
    Ok(())
}

/// Extract the value of `--config <path>` from the command line.
fn config_path_arg(mut args: impl Iterator<Item = String>) -> Result<Option<String>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(value) => path = Some(value),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {other}"),
        }
    }
    Ok(path)
}
