//! Stores every telemetry message in the durable log.

use anyhow::{Context, Result};
use fleet_agents::TelemetryIngest;
use fleet_core::{FleetConfig, InfluxLog, MqttBus, QoS, TELEMETRY_TOPIC};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_tracing();

    let config = FleetConfig::from_env().context("Failed to load configuration")?;
    let log = InfluxLog::new(config.influx.clone()).context("Failed to build InfluxDB client")?;
    let (bus, inbound) = MqttBus::connect(
        &config.mqtt,
        "fleet-ingest",
        vec![(TELEMETRY_TOPIC.to_string(), QoS::AtLeastOnce)],
    );
    info!("Ingesting {} into bucket {}", TELEMETRY_TOPIC, log.bucket());

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });

    let ingest = TelemetryIngest::new(Arc::new(log));
    let stats = ingest.run(inbound, stop_rx).await;
    info!(
        "Ingest stopped: written={}, skipped={}, failures={}",
        stats.written, stats.skipped, stats.failures
    );
    bus.disconnect().await;
    Ok(())
}
