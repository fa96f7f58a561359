use super::{emit_all, ActionClock, Agent, Decision, Observation};
use crate::emitter::{ActionEmitter, EmitOutcome};
use async_trait::async_trait;
use fleet_core::{Action, ActionPayload, AgentKind, MaintenanceIssue, Telemetry, Thresholds};

/// Raises one maintenance request per sensor out of range.
pub struct MaintenanceAgent {
    thresholds: Thresholds,
    emitter: ActionEmitter,
    clock: ActionClock,
    last: Option<Observation>,
}

impl MaintenanceAgent {
    pub fn new(thresholds: &Thresholds, emitter: ActionEmitter) -> Self {
        Self {
            thresholds: *thresholds,
            emitter,
            clock: ActionClock::default(),
            last: None,
        }
    }

    fn issues(&self, t: &Telemetry) -> Vec<(MaintenanceIssue, f64)> {
        let th = &self.thresholds;
        // engine, tire, fuel: the order requests go out in
        let checks = [
            (
                MaintenanceIssue::HighEngineTemp,
                t.engine_temp.filter(|v| *v > th.high_engine_temp),
            ),
            (
                MaintenanceIssue::LowTirePressure,
                t.tire_pressure.filter(|v| *v < th.low_tire_pressure),
            ),
            (
                MaintenanceIssue::LowFuelLevel,
                t.fuel_level.filter(|v| *v < th.low_fuel_level),
            ),
        ];
        checks
            .into_iter()
            .filter_map(|(issue, value)| value.map(|v| (issue, v)))
            .collect()
    }
}

#[async_trait]
impl Agent for MaintenanceAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Maintenance
    }

    fn observe_at(&mut self, telemetry: Telemetry, observed_at: i64) {
        self.last = Observation::accept(telemetry, observed_at);
    }

    fn decide(&mut self) -> Decision {
        let Some(obs) = &self.last else {
            return Vec::new();
        };
        let issues = self.issues(&obs.telemetry);
        let mut decision = Vec::with_capacity(issues.len());
        // one millisecond apart, each request is its own log record
        for (issue, value) in issues {
            decision.push(Action::new(
                obs.telemetry.vehicle_id.clone(),
                ActionPayload::MaintenanceRequest { issue, value },
                self.clock.stamp(obs.observed_at),
            ));
        }
        decision
    }

    async fn act(&self, decision: Decision) -> Vec<EmitOutcome> {
        emit_all(&self.emitter, decision).await
    }
}
