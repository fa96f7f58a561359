//! End-to-end pipeline tests: telemetry in through the runner, actions out on
//! the mock bus and in the in-memory log, summaries from the aggregator.

use fleet_agents::{run_agent, ActionEmitter, Agent, FleetAgent, ReportingAggregator};
use fleet_core::{
    now_millis, Action, ActionPayload, AgentKind, FieldValue, MaintenanceIssue, PointQuery,
    Suggestion, Thresholds, TimeRange, TimeSeriesLog,
};
use fleet_devkit::{TelemetryBuilder, TestHarness};
use std::time::Duration;
use tokio::sync::oneshot;

fn build(harness: &TestHarness, kind: AgentKind) -> FleetAgent {
    let emitter = ActionEmitter::new(harness.bus_handle(), harness.log_handle());
    FleetAgent::build(kind, Thresholds::default(), emitter, Duration::from_secs(30))
}

/// Feeds one record through observe -> decide -> act and returns what was decided.
async fn feed(agent: &mut FleetAgent, telemetry: fleet_core::Telemetry) -> Vec<Action> {
    agent.observe(telemetry);
    let decision = agent.decide();
    let outcomes = agent.act(decision.clone()).await;
    assert_eq!(outcomes.len(), decision.len());
    assert!(outcomes.iter().all(|o| o.is_complete()));
    decision
}

#[tokio::test]
async fn test_scenario_v1_triggers_every_rule_agent() {
    let mut harness = TestHarness::new();
    let v1 = TelemetryBuilder::full("v1", 15.0, 96.0, 10.0, 30.0);

    let mut maintenance = build(&harness, AgentKind::Maintenance);
    let mut energy = build(&harness, AgentKind::Energy);
    let mut utilization = build(&harness, AgentKind::Utilization);
    let mut routing = build(&harness, AgentKind::Routing);

    let m = feed(&mut maintenance, v1.clone()).await;
    let e = feed(&mut energy, v1.clone()).await;
    let u = feed(&mut utilization, v1.clone()).await;
    let r = feed(&mut routing, v1).await;

    let issues: Vec<_> = m
        .iter()
        .map(|a| match &a.payload {
            ActionPayload::MaintenanceRequest { issue, .. } => *issue,
            other => panic!("unexpected payload {:?}", other),
        })
        .collect();
    assert_eq!(
        issues,
        vec![
            MaintenanceIssue::HighEngineTemp,
            MaintenanceIssue::LowTirePressure,
            MaintenanceIssue::LowFuelLevel
        ]
    );
    assert_eq!(e.len(), 1);
    assert_eq!(e[0].type_name(), "charge_schedule");
    assert_eq!(u.len(), 1);
    match &u[0].payload {
        ActionPayload::UtilizationPlan { reason, suggestion } => {
            assert_eq!(reason, "low_speed_idle");
            assert!(Suggestion::ALL.contains(suggestion));
        }
        other => panic!("unexpected payload {:?}", other),
    }
    assert!(r.is_empty());

    harness
        .expect_messages("fleet/action/v1/maintenance", 3)
        .expect_messages("fleet/action/v1/energy", 1)
        .expect_messages("fleet/action/v1/utilization", 1)
        .expect_messages("fleet/action/v1/routing", 0);
    harness.verify_expectations().unwrap();

    for action in m.iter().chain(&e).chain(&u) {
        harness.assert_dual_write(action).unwrap();
    }
    assert_eq!(harness.get_stats().logged_points, 5);
}

#[tokio::test]
async fn test_maintenance_requests_stay_separate_records() {
    let harness = TestHarness::new();
    let mut maintenance = build(&harness, AgentKind::Maintenance);
    let m = feed(
        &mut maintenance,
        TelemetryBuilder::full("v1", 15.0, 96.0, 10.0, 30.0),
    )
    .await;
    assert_eq!(m.len(), 3);

    let query = PointQuery::new("agent_action", TimeRange::new(0, now_millis() + 10))
        .with_tag("vehicle_id", "v1");
    let records = harness.log.query(&query).await.unwrap();
    let logged: Vec<_> = records
        .iter()
        .map(|r| (r.values.get("issue").cloned(), r.values.get("value").cloned()))
        .collect();
    assert_eq!(
        logged,
        vec![
            (
                Some(FieldValue::Str("high_engine_temp".into())),
                Some(FieldValue::Float(96.0))
            ),
            (
                Some(FieldValue::Str("low_tire_pressure".into())),
                Some(FieldValue::Float(30.0))
            ),
            (
                Some(FieldValue::Str("low_fuel_level".into())),
                Some(FieldValue::Float(10.0))
            ),
        ]
    );

    let aggregator = ReportingAggregator::new(harness.log_handle(), Duration::from_secs(600));
    let summaries = aggregator.aggregate_at(now_millis() + 10).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].count, 3);
}

#[tokio::test]
async fn test_scenario_v2_is_quiet() {
    let harness = TestHarness::new();
    let v2 = TelemetryBuilder::full("v2", 60.0, 80.0, 50.0, 33.0);

    for kind in [AgentKind::Energy, AgentKind::Maintenance, AgentKind::Utilization] {
        let mut agent = build(&harness, kind);
        assert!(feed(&mut agent, v2.clone()).await.is_empty());
    }
    let stats = harness.get_stats();
    assert_eq!(stats.total_messages, 0);
    assert_eq!(stats.logged_points, 0);
}

#[tokio::test]
async fn test_runner_stream_is_dual_written_and_summarized() {
    let harness = TestHarness::new();
    let mut agent = build(&harness, AgentKind::Maintenance);
    let inbound = harness.bus.setup_receiver();
    let (_stop_tx, stop_rx) = oneshot::channel();

    harness
        .bus
        .simulate_telemetry(&TelemetryBuilder::full("v1", 15.0, 96.0, 10.0, 30.0))
        .unwrap();
    harness
        .bus
        .simulate_telemetry(&TelemetryBuilder::new("v3").engine_temp(101.5).build())
        .unwrap();
    harness.bus.simulate_incoming("fleet/telemetry", "not json").unwrap();
    harness.bus.close_receiver();

    let stats = run_agent(&mut agent, inbound, stop_rx).await;
    assert_eq!(stats.observed, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.emitted, 4);
    assert_eq!(stats.failures, 0);

    let published = harness.published_actions().unwrap();
    assert_eq!(published.len(), 4);
    for action in &published {
        assert_eq!(action.agent, AgentKind::Maintenance);
        harness.assert_dual_write(action).unwrap();
    }

    let aggregator = ReportingAggregator::new(harness.log_handle(), Duration::from_secs(600));
    let summaries = aggregator.aggregate_at(now_millis() + 1).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].agent, "MaintenanceAgent");
    assert_eq!(summaries[0].count, 4);
}

#[tokio::test]
async fn test_bus_outage_still_logs_actions() {
    let harness = TestHarness::new();
    harness.bus.set_failing(true);
    let mut agent = build(&harness, AgentKind::Energy);

    agent.observe(TelemetryBuilder::new("v9").fuel_level(4.0).build());
    let decision = agent.decide();
    let outcomes = agent.act(decision).await;

    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].published);
    assert!(outcomes[0].logged);
    assert_eq!(harness.log.points_in("agent_action").len(), 1);
    assert_eq!(harness.get_stats().total_messages, 0);
}
