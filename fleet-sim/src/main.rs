//! Vehicle simulator: publishes random telemetry for one vehicle on
//! `fleet/telemetry` every `PUBLISH_INTERVAL` seconds.

use anyhow::{Context, Result};
use fleet_core::{now_millis, FleetConfig, MessageBus, MqttBus, Telemetry, TELEMETRY_TOPIC};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_VEHICLE_ID: &str = "vehicle-1";
const DEFAULT_INTERVAL_SECS: f64 = 2.0;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// One plausible reading: speed 50-80 km/h, engine 70-100 °C, fuel 10-100 %,
/// tires 30-35 PSI.
fn sample<R: Rng>(rng: &mut R, vehicle_id: &str, timestamp: i64) -> Telemetry {
    let mut telemetry = Telemetry::new(vehicle_id);
    telemetry.timestamp = Some(timestamp);
    telemetry.speed = Some(round_to(rng.gen_range(50.0..=80.0), 2));
    telemetry.engine_temp = Some(round_to(rng.gen_range(70.0..=100.0), 1));
    telemetry.fuel_level = Some(round_to(rng.gen_range(10.0..=100.0), 1));
    telemetry.tire_pressure = Some(round_to(rng.gen_range(30.0..=35.0), 1));
    telemetry
}

fn publish_interval() -> Result<Duration> {
    match std::env::var("PUBLISH_INTERVAL") {
        Ok(raw) => {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value for PUBLISH_INTERVAL: {:?}", raw))?;
            Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|d| !d.is_zero())
                .with_context(|| format!("invalid value for PUBLISH_INTERVAL: {:?}", raw))
        }
        Err(_) => Ok(Duration::from_secs_f64(DEFAULT_INTERVAL_SECS)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_tracing();

    let config = FleetConfig::from_env().context("Failed to load configuration")?;
    let vehicle_id = std::env::var("VEHICLE_ID").unwrap_or_else(|_| DEFAULT_VEHICLE_ID.to_string());
    let interval = publish_interval()?;

    let client_id = format!("fleet-sim-{}", vehicle_id);
    let (bus, _inbound) = MqttBus::connect(&config.mqtt, &client_id, Vec::new());
    info!(
        "Simulating {} every {:?} on {}:{}",
        vehicle_id, interval, config.mqtt.host, config.mqtt.port
    );

    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let telemetry = sample(&mut rng, &vehicle_id, now_millis());
                let payload = serde_json::to_vec(&telemetry)?;
                match bus.publish(TELEMETRY_TOPIC, payload).await {
                    Ok(()) => debug!("published {:?}", telemetry),
                    Err(e) => error!("publish failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Simulator stopped");
                break;
            }
        }
    }
    bus.disconnect().await;
    Ok(())
}
