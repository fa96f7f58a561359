use super::{emit_all, ActionClock, Agent, Decision, Observation};
use crate::emitter::{ActionEmitter, EmitOutcome};
use async_trait::async_trait;
use fleet_core::models::REASON_LOW_SPEED_IDLE;
use fleet_core::{Action, ActionPayload, AgentKind, Suggestion, Telemetry, Thresholds};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Suggests a new plan for vehicles crawling below the idle speed.
pub struct UtilizationAgent {
    low_speed: f64,
    emitter: ActionEmitter,
    rng: StdRng,
    clock: ActionClock,
    last: Option<Observation>,
}

impl UtilizationAgent {
    pub fn new(thresholds: &Thresholds, emitter: ActionEmitter) -> Self {
        Self::with_rng(thresholds, emitter, StdRng::from_entropy())
    }

    /// Deterministic suggestions, for tests and replays.
    pub fn seeded(thresholds: &Thresholds, emitter: ActionEmitter, seed: u64) -> Self {
        Self::with_rng(thresholds, emitter, StdRng::seed_from_u64(seed))
    }

    fn with_rng(thresholds: &Thresholds, emitter: ActionEmitter, rng: StdRng) -> Self {
        Self {
            low_speed: thresholds.util_low_speed,
            emitter,
            rng,
            clock: ActionClock::default(),
            last: None,
        }
    }

    fn pick_suggestion(&mut self) -> Suggestion {
        Suggestion::ALL[self.rng.gen_range(0..Suggestion::ALL.len())]
    }
}

#[async_trait]
impl Agent for UtilizationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Utilization
    }

    fn observe_at(&mut self, telemetry: Telemetry, observed_at: i64) {
        self.last = Observation::accept(telemetry, observed_at);
    }

    fn decide(&mut self) -> Decision {
        let (vehicle_id, observed_at) = match &self.last {
            Some(obs) if obs.telemetry.speed.is_some_and(|s| s < self.low_speed) => {
                (obs.telemetry.vehicle_id.clone(), obs.observed_at)
            }
            _ => return Vec::new(),
        };
        let suggestion = self.pick_suggestion();
        vec![Action::new(
            vehicle_id,
            ActionPayload::UtilizationPlan {
                reason: REASON_LOW_SPEED_IDLE.to_string(),
                suggestion,
            },
            self.clock.stamp(observed_at),
        )]
    }

    async fn act(&self, decision: Decision) -> Vec<EmitOutcome> {
        emit_all(&self.emitter, decision).await
    }
}
