//! Probe Agent - Multi-OS telemetry agent
//!
//! Samples host metrics on a fixed interval and pushes each snapshot
//! to the probe collector over HTTP:
//! - Host identification (hostname, primary IPv4, OS family)
//! - CPU, memory, disk and network sampling
//! - Best-effort delivery, a failed cycle is skipped
//! - Cross-platform support (Linux, Windows, macOS)

mod agent;
mod config;
mod discovery;
mod metrics;
mod reporter;

use agent::Agent;
use anyhow::{Context, Result};
use config::AgentConfig;
use discovery::HostIdentity;
use metrics::SystemSampler;
use reporter::HttpReporter;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("probe_agent=info")))
        .init();

    info!("Probe Agent starting...");

    let config_path = AgentConfig::config_file_path()?;
    let (config, created) = AgentConfig::load_or_init(&config_path, |key| std::env::var(key).ok())
        .await
        .context("Failed to load agent configuration")?;
    if created {
        info!("Default configuration written to {}", config_path.display());
    }
    if config.ingest_token.is_none() {
        warn!("No ingest_token configured, reports are sent without X-Client-Secret");
    }

    let identity = HostIdentity::discover();
    let reporter = HttpReporter::new(&config.collector_url, config.request_timeout(), config.ingest_token.clone())
        .context("Failed to build HTTP client")?;
    info!("Reporting to {} every {}s", reporter.endpoint(), config.report_interval_secs);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = stop_tx.send(true);
            }
            Err(e) => {
                // keep the sender alive, dropping it stops the loop
                error!("Cannot listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    });

    let mut agent = Agent::new(SystemSampler::new(identity), reporter, config.report_interval());
    agent.run(stop_rx).await;
    Ok(())
}
