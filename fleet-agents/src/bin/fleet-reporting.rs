//! Periodic per-agent action summaries.

use anyhow::{Context, Result};
use fleet_agents::ReportingAggregator;
use fleet_core::{FleetConfig, InfluxLog};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_tracing();

    let config = FleetConfig::from_env().context("Failed to load configuration")?;
    let log = InfluxLog::new(config.influx.clone()).context("Failed to build InfluxDB client")?;
    info!("Reporting into bucket {}", log.bucket());

    let aggregator = ReportingAggregator::new(Arc::new(log), config.report_interval());
    tokio::select! {
        _ = aggregator.run() => {}
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }
    Ok(())
}
