//! Fleet core - shared building blocks of the fleet telemetry pipeline
//!
//! - Telemetry / Action / AgentSummary data model
//! - Environment-driven configuration and rule thresholds
//! - Message bus abstraction with an MQTT implementation
//! - Time-series log abstraction with an InfluxDB v2 implementation

pub mod bus;
pub mod config;
pub mod influx;
pub mod log;
pub mod models;

pub use bus::{BusError, InboundMessage, MessageBus, MqttBus, QoS};
pub use config::{ConfigError, FleetConfig, InfluxConf, MqttConf, Thresholds};
pub use influx::InfluxLog;
pub use log::{FieldValue, LogError, Point, PointQuery, Record, TimeRange, TimeSeriesLog};
pub use models::{
    Action, ActionPayload, AgentKind, AgentSummary, MaintenanceIssue, Suggestion, Telemetry,
    TelemetryError,
};

/// Inbound telemetry topic, shared by every vehicle.
pub const TELEMETRY_TOPIC: &str = "fleet/telemetry";

/// Installs the fmt subscriber used by every binary; `RUST_LOG` overrides `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Milliseconds since the Unix epoch for the current instant.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
