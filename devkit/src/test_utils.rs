/*!
Test harness for the fleet agents

- Mock bus + in-memory log, handed out as the trait objects agents take
- Expectations on the number of messages per topic
- Dual-write assertions: action on its topic AND as an `agent_action` record
*/

use crate::memory_log::MemoryLog;
use crate::mqtt_stub::MockBus;
use anyhow::Result;
use fleet_core::{Action, MessageBus, TimeSeriesLog};
use std::collections::HashMap;
use std::sync::Arc;

pub struct TestHarness {
    pub bus: MockBus,
    pub log: MemoryLog,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    topic: String,
    expected_count: usize,
}

impl TestHarness {
    pub fn new() -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        Self {
            bus: MockBus::new(),
            log: MemoryLog::new(),
            expectations: Vec::new(),
        }
    }

    pub fn bus_handle(&self) -> Arc<dyn MessageBus> {
        Arc::new(self.bus.clone())
    }

    pub fn log_handle(&self) -> Arc<dyn TimeSeriesLog> {
        Arc::new(self.log.clone())
    }

    pub fn expect_messages(&mut self, topic: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            topic: topic.to_string(),
            expected_count: count,
        });
        self
    }

    pub fn verify_expectations(&self) -> Result<()> {
        for expectation in &self.expectations {
            let actual_count = self.bus.find_messages_by_topic(&expectation.topic).len();
            if actual_count != expectation.expected_count {
                anyhow::bail!(
                    "Expectation failed for topic '{}': expected {} messages, got {}",
                    expectation.topic,
                    expectation.expected_count,
                    actual_count
                );
            }
        }
        Ok(())
    }

    /// Actions published on one topic, decoded
    pub fn actions_on(&self, topic: &str) -> Result<Vec<Action>> {
        self.bus
            .find_messages_by_topic(topic)
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).map_err(Into::into))
            .collect()
    }

    /// Every action published on any topic, decoded
    pub fn published_actions(&self) -> Result<Vec<Action>> {
        self.bus
            .get_published_messages()
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).map_err(Into::into))
            .collect()
    }

    /// The action is on its topic and logged with the same vehicle_id/agent/type
    pub fn assert_dual_write(&self, action: &Action) -> Result<()> {
        let on_bus = self.actions_on(&action.topic())?.iter().any(|a| {
            a.vehicle_id == action.vehicle_id
                && a.agent == action.agent
                && a.type_name() == action.type_name()
        });
        if !on_bus {
            anyhow::bail!("action {:?} not published on {}", action.type_name(), action.topic());
        }

        let in_log = self.log.points_in("agent_action").iter().any(|p| {
            p.tags.get("vehicle_id") == Some(&action.vehicle_id)
                && p.tags.get("agent").map(String::as_str) == Some(action.agent.name())
                && p.fields.get("type").and_then(|v| v.as_str()) == Some(action.type_name())
        });
        if !in_log {
            anyhow::bail!("action {:?} for {} not in log", action.type_name(), action.vehicle_id);
        }
        Ok(())
    }

    pub fn get_stats(&self) -> TestStats {
        let messages = self.bus.get_published_messages();
        let mut topic_counts = HashMap::new();
        for msg in &messages {
            *topic_counts.entry(msg.topic.clone()).or_insert(0) += 1;
        }
        TestStats {
            total_messages: messages.len(),
            topic_counts,
            logged_points: self.log.points().len(),
        }
    }

    pub fn reset(&mut self) {
        self.bus.clear();
        self.log.clear();
        self.expectations.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_messages: usize,
    pub topic_counts: HashMap<String, usize>,
    pub logged_points: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{ActionPayload, MaintenanceIssue};

    #[tokio::test]
    async fn test_harness_dual_write_assertion() {
        let mut harness = TestHarness::new();
        let action = Action::new(
            "v1",
            ActionPayload::MaintenanceRequest {
                issue: MaintenanceIssue::LowTirePressure,
                value: 30.0,
            },
            1,
        );
        harness.expect_messages("fleet/action/v1/maintenance", 1);

        // only the bus side so far
        harness
            .bus_handle()
            .publish(&action.topic(), serde_json::to_vec(&action).unwrap())
            .await
            .unwrap();
        harness.verify_expectations().unwrap();
        assert!(harness.assert_dual_write(&action).is_err());

        harness.log_handle().append(&action.to_point()).await.unwrap();
        harness.assert_dual_write(&action).unwrap();

        let stats = harness.get_stats();
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.logged_points, 1);

        harness.reset();
        assert_eq!(harness.get_stats().total_messages, 0);
    }
}
