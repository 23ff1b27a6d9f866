//! BWS probe - checks the configured BWS endpoints from the command line
//!
//! Loads `BWS_*` settings, runs one health check and prints the verdict, pool
//! metrics and per-endpoint health as JSON. With `--watch` it keeps the
//! background monitor running and prints a report every check interval until
//! interrupted.

use std::process::ExitCode;

use anyhow::Context;
use serde_json::json;
use tokio::signal;
use tracing::{info, warn};

use bws_client::observability::{TracingConfig, init_tracing};
use bws_client::{BwsClient, ClientConfig, HealthState, HealthStatus};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let watch = std::env::args().skip(1).any(|arg| arg == "--watch");

    let config = ClientConfig::from_env().context("loading BWS configuration")?;
    init_tracing(&TracingConfig::from_env()).context("installing tracing subscriber")?;

    let client = BwsClient::new(&config).context("building BWS client")?;
    info!(endpoint = %client.current_endpoint(), watch, "Starting BWS probe");

    let status = client.check_health_now().await;
    report(&client, &status)?;

    if watch {
        client.start_health_monitor();
        let mut ticker = tokio::time::interval(config.health_check_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = client.health_status().await;
                    report(&client, &status)?;
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping probe");
                    break;
                }
            }
        }
    }

    client.shutdown();

    let status = client.latest_health().unwrap_or(status);
    if status.state == HealthState::Unhealthy {
        warn!(endpoint = %status.endpoint, message = %status.message, "BWS endpoint unhealthy");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn report(client: &BwsClient, status: &HealthStatus) -> anyhow::Result<()> {
    let report = json!({
        "health": status,
        "pool": client.connection_pool_metrics(),
        "endpoints": client.endpoint_health(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
