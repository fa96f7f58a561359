//! Runs one decision agent against the telemetry stream.
//!
//! Usage: `fleet-agent <energy|maintenance|utilization|routing>` (or `AGENT_KIND`).

use anyhow::{Context, Result};
use fleet_agents::{parse_kind, run_agent, ActionEmitter, Agent, FleetAgent};
use fleet_core::{FleetConfig, InfluxLog, MqttBus, TELEMETRY_TOPIC};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

const USAGE: &str =
    "usage: fleet-agent <energy|maintenance|utilization|routing> (or set AGENT_KIND)";

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_tracing();

    let kind_arg = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AGENT_KIND").ok())
        .context(USAGE)?;
    let kind = parse_kind(&kind_arg)?;

    let config = FleetConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Starting {} (broker {}:{}, thresholds {:?})",
        kind, config.mqtt.host, config.mqtt.port, config.thresholds
    );

    let log = InfluxLog::new(config.influx.clone()).context("Failed to build InfluxDB client")?;
    let (bus, inbound) = MqttBus::connect(
        &config.mqtt,
        &format!("fleet-{}-agent", kind.topic_segment()),
        vec![(TELEMETRY_TOPIC.to_string(), FleetAgent::subscription_qos(kind))],
    );

    let emitter = ActionEmitter::new(Arc::new(bus.clone()), Arc::new(log));
    let mut agent = FleetAgent::build(kind, config.thresholds, emitter, config.routing_heartbeat());

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });

    let stats = run_agent(&mut agent, inbound, stop_rx).await;
    info!(
        "{} stopped: observed={} skipped={} emitted={} failures={} heartbeats={} reconnects={}",
        agent.kind(),
        stats.observed,
        stats.skipped,
        stats.emitted,
        stats.failures,
        stats.heartbeats,
        bus.reconnects()
    );
    bus.disconnect().await;
    Ok(())
}
