/*!
Mock message bus for development without a broker

Records every publish, lets tests inject inbound messages through the same
mpsc channel shape `MqttBus::connect` returns, and can be switched into a
failing mode to exercise transport errors.
*/

use async_trait::async_trait;
use fleet_core::{BusError, InboundMessage, MessageBus, Telemetry, TELEMETRY_TOPIC};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Mock bus mirroring `MqttBus`
#[derive(Clone, Default)]
pub struct MockBus {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>>,
    failing: Arc<AtomicBool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel on which `simulate_incoming` delivers messages
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock() = Some(sender);
        receiver
    }

    /// Every publish fails with `BusError::Unavailable` while set
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> anyhow::Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        };
        let topic = message.topic.clone();
        match self.message_sender.lock().as_ref() {
            Some(sender) => sender
                .send(message)
                .map_err(|e| anyhow::anyhow!("Send error: {}", e))?,
            None => anyhow::bail!("no receiver set up"),
        }
        tracing::debug!("[mock-bus] simulated incoming on {}", topic);
        Ok(())
    }

    pub fn simulate_telemetry(&self, telemetry: &Telemetry) -> anyhow::Result<()> {
        self.simulate_incoming(TELEMETRY_TOPIC, serde_json::to_vec(telemetry)?)
    }

    /// Closes the inbound channel, ending any runner reading from it
    pub fn close_receiver(&self) {
        self.message_sender.lock().take();
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parses the latest message of a topic as JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> anyhow::Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(BusError::Unavailable("mock bus set to fail".into()));
        }
        tracing::debug!("[mock-bus] published to {}: {} bytes", topic, payload.len());
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_bus_publish() {
        let bus = MockBus::new();
        bus.publish("test/topic", b"test message".to_vec()).await.unwrap();

        let messages = bus.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "test/topic");
        assert_eq!(messages[0].payload, b"test message");
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let bus = MockBus::new();
        bus.set_failing(true);
        assert!(bus.publish("t", vec![1]).await.is_err());
        assert!(bus.get_published_messages().is_empty());
        bus.set_failing(false);
        assert!(bus.publish("t", vec![1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_simulated_incoming_reaches_receiver() {
        let bus = MockBus::new();
        let mut rx = bus.setup_receiver();
        bus.simulate_telemetry(&Telemetry::new("v1")).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, TELEMETRY_TOPIC);
        bus.close_receiver();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_json_message_parsing() {
        let bus = MockBus::new();
        let payload = serde_json::to_vec(&serde_json::json!({"number": 42})).unwrap();
        bus.publish("json/topic", payload).await.unwrap();

        let parsed: Option<serde_json::Value> = bus.get_last_json_message("json/topic").unwrap();
        assert_eq!(parsed.unwrap()["number"], 42);
    }
}
