//! Agent runner: feeds the inbound telemetry stream through one agent,
//! strictly one message at a time.

use crate::agents::Agent;
use fleet_core::{InboundMessage, Telemetry, TELEMETRY_TOPIC};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunnerStats {
    /// Telemetry records handed to the agent
    pub observed: u64,
    /// Payloads that were not valid telemetry
    pub skipped: u64,
    /// Actions emitted
    pub emitted: u64,
    /// Failed bus publishes or log appends
    pub failures: u64,
    /// "alive" lines logged
    pub heartbeats: u64,
}

/// observe -> decide -> act for one inbound message.
pub async fn handle_message<A: Agent + ?Sized>(
    agent: &mut A,
    msg: &InboundMessage,
    stats: &mut RunnerStats,
) {
    if msg.topic != TELEMETRY_TOPIC {
        debug!("[{}] ignoring message on {}", agent.kind(), msg.topic);
        return;
    }
    let telemetry = match Telemetry::from_slice(&msg.payload) {
        Ok(t) => t,
        Err(e) => {
            stats.skipped += 1;
            debug!("[{}] skipping payload: {}", agent.kind(), e);
            return;
        }
    };

    stats.observed += 1;
    agent.observe(telemetry);
    let decision = agent.decide();
    if decision.is_empty() {
        return;
    }
    for outcome in agent.act(decision).await {
        stats.emitted += 1;
        stats.failures += outcome.failures();
    }
}

/// Runs until the inbound channel closes or `shutdown` fires.
pub async fn run_agent<A: Agent + ?Sized>(
    agent: &mut A,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown: oneshot::Receiver<()>,
) -> RunnerStats {
    let mut stats = RunnerStats::default();
    let liveness = agent.liveness_interval();
    let mut ticker = tokio::time::interval(liveness.unwrap_or(Duration::from_secs(3600)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    info!("[{}] running", agent.kind());
    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Some(msg) => handle_message(&mut *agent, &msg, &mut stats).await,
                None => {
                    info!("[{}] inbound stream closed", agent.kind());
                    break;
                }
            },
            _ = ticker.tick(), if liveness.is_some() => {
                stats.heartbeats += 1;
                info!(
                    "[{}] alive (observed={}, skipped={}, emitted={}, failures={})",
                    agent.kind(), stats.observed, stats.skipped, stats.emitted, stats.failures
                );
            }
            _ = &mut shutdown => {
                info!("[{}] shutdown requested", agent.kind());
                break;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support;
    use crate::agents::{EnergyAgent, RoutingAgent};
    use fleet_core::Thresholds;
    use fleet_devkit::TelemetryBuilder;

    fn msg(topic: &str, payload: &[u8]) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_skipped() {
        let (emitter, bus, _) = test_support::emitter();
        let mut agent = EnergyAgent::new(&Thresholds::default(), emitter);
        let mut stats = RunnerStats::default();

        let inputs = [
            msg(TELEMETRY_TOPIC, b"{oops"),
            msg(TELEMETRY_TOPIC, br#"{"fuel_level":1}"#),
            msg("fleet/other", br#"{"vehicle_id":"v1","fuel_level":1}"#),
        ];
        for input in &inputs {
            handle_message(&mut agent, input, &mut stats).await;
        }

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.observed, 0);
        assert!(bus.get_published_messages().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stream_closes() {
        let (emitter, bus, log) = test_support::emitter();
        let mut agent = EnergyAgent::new(&Thresholds::default(), emitter);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        for fuel in [5.0, 50.0, 12.0] {
            let payload = TelemetryBuilder::new("v7").fuel_level(fuel).to_payload();
            tx.send(msg(TELEMETRY_TOPIC, &payload)).unwrap();
        }
        tx.send(msg(TELEMETRY_TOPIC, b"garbage")).unwrap();
        drop(tx);

        let stats = run_agent(&mut agent, rx, stop_rx).await;
        assert_eq!(
            stats,
            RunnerStats {
                observed: 3,
                skipped: 1,
                emitted: 2,
                failures: 0,
                heartbeats: 0
            }
        );
        assert_eq!(bus.find_messages_by_topic("fleet/action/v7/energy").len(), 2);
        assert_eq!(log.points_in("agent_action").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_writes_are_counted() {
        let (emitter, bus, log) = test_support::emitter();
        bus.set_failing(true);
        log.set_fail_appends(true);
        let mut agent = EnergyAgent::new(&Thresholds::default(), emitter);
        let mut stats = RunnerStats::default();

        let payload = TelemetryBuilder::new("v1").fuel_level(2.0).to_payload();
        handle_message(&mut agent, &msg(TELEMETRY_TOPIC, &payload), &mut stats).await;
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.failures, 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_runner() {
        let mut agent = RoutingAgent::new(Duration::from_secs(30));
        let (_tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        stop_tx.send(()).unwrap();

        let stats = run_agent(&mut agent, rx, stop_rx).await;
        assert_eq!(stats, RunnerStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_routing_reports_alive_on_each_interval() {
        let (tx, rx) = mpsc::unbounded_channel::<InboundMessage>();
        let (stop_tx, stop_rx) = oneshot::channel();
        let runner = tokio::spawn(async move {
            let mut agent = RoutingAgent::new(Duration::from_secs(30));
            run_agent(&mut agent, rx, stop_rx).await
        });

        // ticks at 30 s, 60 s and 90 s
        tokio::time::sleep(Duration::from_secs(95)).await;
        stop_tx.send(()).unwrap();
        let stats = runner.await.unwrap();
        drop(tx);

        assert_eq!(stats.heartbeats, 3);
        assert_eq!(stats.emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_agents_stay_silent() {
        let (emitter, _, _) = test_support::emitter();
        let (_tx, rx) = mpsc::unbounded_channel::<InboundMessage>();
        let (stop_tx, stop_rx) = oneshot::channel();
        let runner = tokio::spawn(async move {
            let mut agent = EnergyAgent::new(&Thresholds::default(), emitter);
            run_agent(&mut agent, rx, stop_rx).await
        });

        tokio::time::sleep(Duration::from_secs(7200)).await;
        stop_tx.send(()).unwrap();
        assert_eq!(runner.await.unwrap().heartbeats, 0);
    }
}
