use super::{Agent, Decision};
use crate::emitter::EmitOutcome;
use async_trait::async_trait;
use fleet_core::{AgentKind, Telemetry};
use std::time::Duration;
use tracing::trace;

/// Placeholder: keeps a telemetry subscription open and reports liveness.
/// Never emits.
pub struct RoutingAgent {
    heartbeat: Duration,
}

impl RoutingAgent {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            heartbeat: heartbeat.max(Duration::from_secs(1)),
        }
    }
}

#[async_trait]
impl Agent for RoutingAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Routing
    }

    fn observe_at(&mut self, telemetry: Telemetry, _observed_at: i64) {
        trace!("[routing] telemetry from {}", telemetry.vehicle_id);
    }

    fn decide(&mut self) -> Decision {
        Vec::new()
    }

    async fn act(&self, _decision: Decision) -> Vec<EmitOutcome> {
        Vec::new()
    }

    fn liveness_interval(&self) -> Option<Duration> {
        Some(self.heartbeat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_devkit::TelemetryBuilder;

    #[tokio::test]
    async fn test_routing_never_emits() {
        let mut agent = RoutingAgent::new(Duration::from_secs(30));
        agent.observe(TelemetryBuilder::full("v1", 1.0, 150.0, 1.0, 1.0));
        let decision = agent.decide();
        assert!(decision.is_empty());
        assert!(agent.act(decision).await.is_empty());
        assert_eq!(agent.liveness_interval(), Some(Duration::from_secs(30)));
    }
}
