//! Decision agents
//!
//! Every agent follows the same lifecycle over the telemetry stream:
//! `observe` one record, `decide` on it, `act` on the decision through the
//! shared [`ActionEmitter`]. The set of agents is closed; [`FleetAgent`]
//! dispatches over it statically.

mod energy;
mod maintenance;
mod routing;
mod utilization;

pub use energy::EnergyAgent;
pub use maintenance::MaintenanceAgent;
pub use routing::RoutingAgent;
pub use utilization::UtilizationAgent;

use crate::emitter::{ActionEmitter, EmitOutcome};
use async_trait::async_trait;
use fleet_core::{now_millis, Action, AgentKind, QoS, Telemetry, Thresholds};
use std::time::Duration;

/// Actions produced by one `decide` call, in emission order.
pub type Decision = Vec<Action>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unknown agent kind {0:?} (expected energy, maintenance, utilization or routing)")]
    UnknownKind(String),
}

/// Accepts either the topic segment (`energy`) or the agent name (`EnergyAgent`).
pub fn parse_kind(value: &str) -> Result<AgentKind, AgentError> {
    let trimmed = value.trim();
    AgentKind::from_segment(trimmed)
        .or_else(|| {
            AgentKind::ALL
                .into_iter()
                .find(|k| k.name().eq_ignore_ascii_case(trimmed))
        })
        .ok_or_else(|| AgentError::UnknownKind(value.to_string()))
}

/// The record an agent last accepted, with the instant it was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub telemetry: Telemetry,
    pub observed_at: i64,
}

impl Observation {
    /// `None` for records that cannot be attributed to a vehicle.
    pub fn accept(telemetry: Telemetry, observed_at: i64) -> Option<Self> {
        if telemetry.vehicle_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            telemetry,
            observed_at,
        })
    }
}

/// Action timestamps for one agent, strictly increasing.
///
/// The log identifies a point by measurement, tags and millisecond, so two
/// actions of one agent for one vehicle sharing a millisecond would collapse
/// into a single record.
#[derive(Debug, Default)]
pub(crate) struct ActionClock {
    last: Option<i64>,
}

impl ActionClock {
    pub(crate) fn stamp(&mut self, observed_at: i64) -> i64 {
        let ts = match self.last {
            Some(last) if observed_at <= last => last + 1,
            _ => observed_at,
        };
        self.last = Some(ts);
        ts
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Takes in one record. Never fails; unusable records are dropped.
    fn observe(&mut self, telemetry: Telemetry) {
        self.observe_at(telemetry, now_millis());
    }

    fn observe_at(&mut self, telemetry: Telemetry, observed_at: i64);

    /// Rule evaluation against the last observation. No I/O.
    fn decide(&mut self) -> Decision;

    /// Dual-writes every action of the decision, in order.
    async fn act(&self, decision: Decision) -> Vec<EmitOutcome>;

    /// Period of the "alive" log line, for agents that report liveness.
    fn liveness_interval(&self) -> Option<Duration> {
        None
    }
}

pub(crate) async fn emit_all(emitter: &ActionEmitter, decision: Decision) -> Vec<EmitOutcome> {
    let mut outcomes = Vec::with_capacity(decision.len());
    for action in &decision {
        outcomes.push(emitter.emit(action).await);
    }
    outcomes
}

pub enum FleetAgent {
    Energy(EnergyAgent),
    Maintenance(MaintenanceAgent),
    Utilization(UtilizationAgent),
    Routing(RoutingAgent),
}

impl FleetAgent {
    pub fn build(
        kind: AgentKind,
        thresholds: Thresholds,
        emitter: ActionEmitter,
        heartbeat: Duration,
    ) -> Self {
        match kind {
            AgentKind::Energy => FleetAgent::Energy(EnergyAgent::new(&thresholds, emitter)),
            AgentKind::Maintenance => {
                FleetAgent::Maintenance(MaintenanceAgent::new(&thresholds, emitter))
            }
            AgentKind::Utilization => {
                FleetAgent::Utilization(UtilizationAgent::new(&thresholds, emitter))
            }
            AgentKind::Routing => FleetAgent::Routing(RoutingAgent::new(heartbeat)),
        }
    }

    /// Rule agents need every record; routing only listens.
    pub fn subscription_qos(kind: AgentKind) -> QoS {
        match kind {
            AgentKind::Routing => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }
}

#[async_trait]
impl Agent for FleetAgent {
    fn kind(&self) -> AgentKind {
        match self {
            FleetAgent::Energy(a) => a.kind(),
            FleetAgent::Maintenance(a) => a.kind(),
            FleetAgent::Utilization(a) => a.kind(),
            FleetAgent::Routing(a) => a.kind(),
        }
    }

    fn observe_at(&mut self, telemetry: Telemetry, observed_at: i64) {
        match self {
            FleetAgent::Energy(a) => a.observe_at(telemetry, observed_at),
            FleetAgent::Maintenance(a) => a.observe_at(telemetry, observed_at),
            FleetAgent::Utilization(a) => a.observe_at(telemetry, observed_at),
            FleetAgent::Routing(a) => a.observe_at(telemetry, observed_at),
        }
    }

    fn decide(&mut self) -> Decision {
        match self {
            FleetAgent::Energy(a) => a.decide(),
            FleetAgent::Maintenance(a) => a.decide(),
            FleetAgent::Utilization(a) => a.decide(),
            FleetAgent::Routing(a) => a.decide(),
        }
    }

    async fn act(&self, decision: Decision) -> Vec<EmitOutcome> {
        match self {
            FleetAgent::Energy(a) => a.act(decision).await,
            FleetAgent::Maintenance(a) => a.act(decision).await,
            FleetAgent::Utilization(a) => a.act(decision).await,
            FleetAgent::Routing(a) => a.act(decision).await,
        }
    }

    fn liveness_interval(&self) -> Option<Duration> {
        match self {
            FleetAgent::Energy(a) => a.liveness_interval(),
            FleetAgent::Maintenance(a) => a.liveness_interval(),
            FleetAgent::Utilization(a) => a.liveness_interval(),
            FleetAgent::Routing(a) => a.liveness_interval(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_accepts_segment_and_name() {
        assert_eq!(parse_kind("energy").unwrap(), AgentKind::Energy);
        assert_eq!(parse_kind(" Maintenance ").unwrap(), AgentKind::Maintenance);
        assert_eq!(parse_kind("UtilizationAgent").unwrap(), AgentKind::Utilization);
        assert!(matches!(parse_kind("billing"), Err(AgentError::UnknownKind(_))));
    }

    #[test]
    fn test_observation_needs_vehicle() {
        assert!(Observation::accept(Telemetry::new(""), 1).is_none());
        assert!(Observation::accept(Telemetry::new("v1"), 1).is_some());
    }

    #[test]
    fn test_build_dispatches_by_kind() {
        let (emitter, _, _) = test_support::emitter();
        for kind in AgentKind::ALL {
            let agent = FleetAgent::build(
                kind,
                Thresholds::default(),
                emitter.clone(),
                Duration::from_secs(30),
            );
            assert_eq!(agent.kind(), kind);
        }
        assert_eq!(FleetAgent::subscription_qos(AgentKind::Routing), QoS::AtMostOnce);
        assert_eq!(FleetAgent::subscription_qos(AgentKind::Energy), QoS::AtLeastOnce);
    }

    #[test]
    fn test_clock_never_repeats_a_millisecond() {
        let mut clock = ActionClock::default();
        assert_eq!(clock.stamp(100), 100);
        assert_eq!(clock.stamp(100), 101);
        assert_eq!(clock.stamp(100), 102);
        // an earlier observation still moves forward
        assert_eq!(clock.stamp(50), 103);
        assert_eq!(clock.stamp(500), 500);
    }
}
