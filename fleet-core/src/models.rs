//! Wire and log data model: telemetry in, actions and summaries out.

use crate::log::{FieldValue, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("telemetry without vehicle_id")]
    MissingVehicleId,
}

/// One sensor snapshot from one vehicle (matches the `fleet/telemetry` payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub vehicle_id: String,
    /// Milliseconds since epoch, as stamped by the vehicle.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub engine_temp: Option<f64>,
    #[serde(default)]
    pub fuel_level: Option<f64>,
    #[serde(default)]
    pub tire_pressure: Option<f64>,
}

impl Telemetry {
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            timestamp: None,
            speed: None,
            engine_temp: None,
            fuel_level: None,
            tire_pressure: None,
        }
    }

    /// Parses and validates a raw bus payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, TelemetryError> {
        let telemetry: Telemetry = serde_json::from_slice(payload)?;
        if telemetry.vehicle_id.trim().is_empty() {
            return Err(TelemetryError::MissingVehicleId);
        }
        Ok(telemetry)
    }

    /// True when no physical quantity is present at all.
    pub fn is_empty(&self) -> bool {
        self.speed.is_none()
            && self.engine_temp.is_none()
            && self.fuel_level.is_none()
            && self.tire_pressure.is_none()
    }

    /// `vehicle_telemetry` point; absent fields are left out, missing timestamp
    /// falls back to `received_at`.
    pub fn to_point(&self, received_at: i64) -> Point {
        let mut point = Point::new("vehicle_telemetry", self.timestamp.unwrap_or(received_at))
            .tag("vehicle_id", &self.vehicle_id);
        for (name, value) in [
            ("speed", self.speed),
            ("engine_temp", self.engine_temp),
            ("fuel_level", self.fuel_level),
            ("tire_pressure", self.tire_pressure),
        ] {
            if let Some(v) = value {
                point = point.field(name, FieldValue::Float(v));
            }
        }
        point
    }
}

/// The closed set of agent variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "EnergyAgent")]
    Energy,
    #[serde(rename = "MaintenanceAgent")]
    Maintenance,
    #[serde(rename = "UtilizationAgent")]
    Utilization,
    #[serde(rename = "RoutingAgent")]
    Routing,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Energy,
        AgentKind::Maintenance,
        AgentKind::Utilization,
        AgentKind::Routing,
    ];

    /// Identifier used in `agent` fields and log tags.
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Energy => "EnergyAgent",
            AgentKind::Maintenance => "MaintenanceAgent",
            AgentKind::Utilization => "UtilizationAgent",
            AgentKind::Routing => "RoutingAgent",
        }
    }

    /// Last segment of the outbound action topic.
    pub fn topic_segment(&self) -> &'static str {
        match self {
            AgentKind::Energy => "energy",
            AgentKind::Maintenance => "maintenance",
            AgentKind::Utilization => "utilization",
            AgentKind::Routing => "routing",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        let wanted = segment.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.topic_segment() == wanted)
    }

    pub fn action_topic(&self, vehicle_id: &str) -> String {
        format!("fleet/action/{}/{}", vehicle_id, self.topic_segment())
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceIssue {
    HighEngineTemp,
    LowTirePressure,
    LowFuelLevel,
}

impl MaintenanceIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceIssue::HighEngineTemp => "high_engine_temp",
            MaintenanceIssue::LowTirePressure => "low_tire_pressure",
            MaintenanceIssue::LowFuelLevel => "low_fuel_level",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suggestion {
    ReassignLoad,
    CombineWithRoute,
    ShiftSchedule,
}

impl Suggestion {
    pub const ALL: [Suggestion; 3] = [
        Suggestion::ReassignLoad,
        Suggestion::CombineWithRoute,
        Suggestion::ShiftSchedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Suggestion::ReassignLoad => "reassign_load",
            Suggestion::CombineWithRoute => "combine_with_route",
            Suggestion::ShiftSchedule => "shift_schedule",
        }
    }
}

pub const SCHEDULE_NEAREST_STATION: &str = "nearest_station";
pub const REASON_LOW_SPEED_IDLE: &str = "low_speed_idle";

/// Decision category plus its agent-specific fields; serialized flat with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    ChargeSchedule { fuel_level: f64, schedule: String },
    MaintenanceRequest { issue: MaintenanceIssue, value: f64 },
    UtilizationPlan { reason: String, suggestion: Suggestion },
}

impl ActionPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionPayload::ChargeSchedule { .. } => "charge_schedule",
            ActionPayload::MaintenanceRequest { .. } => "maintenance_request",
            ActionPayload::UtilizationPlan { .. } => "utilization_plan",
        }
    }

    /// The only agent allowed to emit this decision type.
    pub fn agent(&self) -> AgentKind {
        match self {
            ActionPayload::ChargeSchedule { .. } => AgentKind::Energy,
            ActionPayload::MaintenanceRequest { .. } => AgentKind::Maintenance,
            ActionPayload::UtilizationPlan { .. } => AgentKind::Utilization,
        }
    }

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        match self {
            ActionPayload::ChargeSchedule { fuel_level, schedule } => vec![
                ("fuel_level", FieldValue::Float(*fuel_level)),
                ("schedule", FieldValue::Str(schedule.clone())),
            ],
            ActionPayload::MaintenanceRequest { issue, value } => vec![
                ("issue", FieldValue::Str(issue.as_str().to_string())),
                ("value", FieldValue::Float(*value)),
            ],
            ActionPayload::UtilizationPlan { reason, suggestion } => vec![
                ("reason", FieldValue::Str(reason.clone())),
                ("suggestion", FieldValue::Str(suggestion.as_str().to_string())),
            ],
        }
    }
}

/// A decision emitted by one agent. Never updated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub vehicle_id: String,
    pub agent: AgentKind,
    #[serde(flatten)]
    pub payload: ActionPayload,
    pub timestamp: i64,
}

impl Action {
    /// The `agent` field is taken from the payload, so the type always belongs
    /// to the emitting agent's taxonomy.
    pub fn new(vehicle_id: impl Into<String>, payload: ActionPayload, timestamp: i64) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            agent: payload.agent(),
            payload,
            timestamp,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }

    pub fn topic(&self) -> String {
        self.agent.action_topic(&self.vehicle_id)
    }

    /// `agent_action` point: tags vehicle_id/agent, fields type + payload.
    pub fn to_point(&self) -> Point {
        let mut point = Point::new("agent_action", self.timestamp)
            .tag("vehicle_id", &self.vehicle_id)
            .tag("agent", self.agent.name())
            .field("type", FieldValue::Str(self.type_name().to_string()));
        for (name, value) in self.payload.fields() {
            point = point.field(name, value);
        }
        point
    }
}

/// Per-agent action count for one aggregation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent: String,
    pub count: u64,
    pub timestamp: i64,
}

impl AgentSummary {
    pub fn to_point(&self) -> Point {
        Point::new("agent_summary", self.timestamp)
            .tag("agent", &self.agent)
            .field("count", FieldValue::Integer(self.count as i64))
    }
}
