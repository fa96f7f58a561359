//! Configuration management
//!
//! Everything is supplied through the environment at process start
//! (optionally seeded from a `.env` file) and never changes afterwards:
//! - MQTT broker endpoint
//! - InfluxDB endpoint, credentials and bucket
//! - Rule thresholds
//! - Aggregation / liveness intervals

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub mqtt: MqttConf,
    pub influx: InfluxConf,
    pub thresholds: Thresholds,
    pub report_interval_secs: u64,
    pub routing_heartbeat_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConf {
    pub url: String,
    #[serde(skip_serializing, default)] // Never serialize credentials
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub timeout_ms: u64,
}

/// Rule limits shared by the agents. Read-only once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high_engine_temp: f64,
    pub low_tire_pressure: f64,
    pub low_fuel_level: f64,
    pub util_low_speed: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_engine_temp: 95.0,
            low_tire_pressure: 32.0,
            low_fuel_level: 15.0,
            util_low_speed: 20.0,
        }
    }
}

impl Thresholds {
    /// Looks a limit up by its configuration name (e.g. `high_engine_temp`).
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "high_engine_temp" => Some(self.high_engine_temp),
            "low_tire_pressure" => Some(self.low_tire_pressure),
            "low_fuel_level" => Some(self.low_fuel_level),
            "util_low_speed" => Some(self.util_low_speed),
            _ => None,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf {
                host: "localhost".into(),
                port: 1883,
                keep_alive_secs: 60,
            },
            influx: InfluxConf {
                url: "http://localhost:8086".into(),
                token: String::new(),
                org: "my-org".into(),
                bucket: "fleet_metrics".into(),
                timeout_ms: 30_000,
            },
            thresholds: Thresholds::default(),
            report_interval_secs: 600,
            routing_heartbeat_secs: 30,
        }
    }
}

impl FleetConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup("MQTT_BROKER") {
            cfg.mqtt.host = host;
        }
        parse_into(&lookup, "MQTT_PORT", &mut cfg.mqtt.port)?;
        parse_into(&lookup, "MQTT_KEEP_ALIVE_SEC", &mut cfg.mqtt.keep_alive_secs)?;

        if let Some(url) = lookup("INFLUX_URL") {
            cfg.influx.url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup("INFLUX_TOKEN") {
            cfg.influx.token = token;
        }
        if let Some(org) = lookup("INFLUX_ORG") {
            cfg.influx.org = org;
        }
        if let Some(bucket) = lookup("INFLUX_BUCKET") {
            cfg.influx.bucket = bucket;
        }
        parse_into(&lookup, "INFLUX_TIMEOUT_MS", &mut cfg.influx.timeout_ms)?;

        let t = &mut cfg.thresholds;
        parse_into(&lookup, "HIGH_ENGINE_TEMP", &mut t.high_engine_temp)?;
        parse_into(&lookup, "LOW_TIRE_PRESSURE", &mut t.low_tire_pressure)?;
        parse_into(&lookup, "LOW_FUEL_LEVEL", &mut t.low_fuel_level)?;
        parse_into(&lookup, "UTIL_LOW_SPEED", &mut t.util_low_speed)?;

        parse_into(&lookup, "REPORT_INTERVAL_SEC", &mut cfg.report_interval_secs)?;
        parse_into(&lookup, "ROUTING_HEARTBEAT_SEC", &mut cfg.routing_heartbeat_secs)?;
        if cfg.report_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REPORT_INTERVAL_SEC",
                value: "0".into(),
            });
        }

        Ok(cfg)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn routing_heartbeat(&self) -> Duration {
        Duration::from_secs(self.routing_heartbeat_secs.max(1))
    }
}

fn parse_into<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw.clone() })?;
    }
    Ok(())
}
