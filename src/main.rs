//! ServerPulse - adaptive uptime and latency monitor
//!
//! Discovers the common subdomains of a seed address, probes them on a fixed
//! cadence and classifies each one with an EWMA-based anomaly detector.

mod config;
mod monitor;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use monitor::Monitor;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("serverpulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting ServerPulse on port {}...", cfg.http_port);
    tracing::info!(
        "Polling every {:?} with {:?} probe timeout (alpha={}, threshold={})",
        cfg.poll_interval,
        cfg.probe_timeout,
        cfg.alpha,
        cfg.threshold
    );

    let monitor = Arc::new(Monitor::new(cfg.monitor_config()));

    // Start web server
    let server = Server::new(cfg, monitor.clone());
    server.start().await?;

    // Let an in-flight cycle settle before exiting
    monitor.stop();
    monitor.join().await;

    Ok(())
}
