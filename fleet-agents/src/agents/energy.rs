use super::{emit_all, ActionClock, Agent, Decision, Observation};
use crate::emitter::{ActionEmitter, EmitOutcome};
use async_trait::async_trait;
use fleet_core::models::SCHEDULE_NEAREST_STATION;
use fleet_core::{Action, ActionPayload, AgentKind, Telemetry, Thresholds};

/// Schedules a charge/refuel stop when fuel runs low.
pub struct EnergyAgent {
    low_fuel_level: f64,
    emitter: ActionEmitter,
    clock: ActionClock,
    last: Option<Observation>,
}

impl EnergyAgent {
    pub fn new(thresholds: &Thresholds, emitter: ActionEmitter) -> Self {
        Self {
            low_fuel_level: thresholds.low_fuel_level,
            emitter,
            clock: ActionClock::default(),
            last: None,
        }
    }
}

#[async_trait]
impl Agent for EnergyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Energy
    }

    fn observe_at(&mut self, telemetry: Telemetry, observed_at: i64) {
        self.last = Observation::accept(telemetry, observed_at);
    }

    fn decide(&mut self) -> Decision {
        let Some(obs) = &self.last else {
            return Vec::new();
        };
        match obs.telemetry.fuel_level {
            Some(level) if level < self.low_fuel_level => vec![Action::new(
                obs.telemetry.vehicle_id.clone(),
                ActionPayload::ChargeSchedule {
                    fuel_level: level,
                    schedule: SCHEDULE_NEAREST_STATION.to_string(),
                },
                self.clock.stamp(obs.observed_at),
            )],
            _ => Vec::new(),
        }
    }

    async fn act(&self, decision: Decision) -> Vec<EmitOutcome> {
        emit_all(&self.emitter, decision).await
    }
}
