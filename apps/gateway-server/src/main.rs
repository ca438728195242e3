//! Gateway Server - standalone binary for the toybox audio/control gateway.
//!
//! Terminates devices' UDP audio and MQTT control traffic and bridges each
//! into a per-device LiveKit room. One command, no required flags: every
//! setting not in `mqtt.json` comes from the environment (§6).

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gateway_core::bootstrap_services;
use tokio::signal;

use crate::config::ServerConfig;

/// Gateway Server - headless device-to-room audio/control gateway.
#[derive(Parser, Debug)]
#[command(name = "gateway-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "mqtt.json", env = "GATEWAY_CONFIG")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "GATEWAY_LOG_LEVEL")]
    log_level: log::LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Gateway Server v{}", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    let core_config = server_config.to_core_config();

    let (services, control_rx) = bootstrap_services(core_config)
        .await
        .context("failed to bootstrap gateway services")?;

    log::info!("Gateway services bootstrapped, listening for devices");

    let run_handle = {
        let services = services.clone();
        tokio::spawn(async move { services.run(control_rx).await })
    };

    shutdown_signal().await;
    log::info!("Shutdown signal received, closing sessions...");

    services.shutdown();
    if let Err(e) = run_handle.await {
        log::warn!("gateway run task did not shut down cleanly: {e}");
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
