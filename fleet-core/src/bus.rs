//! Message bus: publish/subscribe transport between ingest, agents and consumers.
//!
//! `MqttBus` wraps a rumqttc `AsyncClient`; its event loop runs in a spawned
//! task that (re)subscribes on every ConnAck and forwards inbound publishes
//! to the owner through an mpsc channel.

use crate::config::MqttConf;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions};
pub use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("cannot encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// A message received on a subscribed topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// At-least-once, non-retained publish.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

/// Connection status shared between the event loop task and the bus handle.
#[derive(Debug, Default)]
struct LinkState {
    connected: AtomicBool,
    reconnects: AtomicU32,
}

#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    link: Arc<LinkState>,
}

impl MqttBus {
    /// Creates the client and spawns its event loop. `subscriptions` are
    /// issued on every (re)connection; inbound publishes arrive on the
    /// returned receiver in broker order.
    pub fn connect(
        conf: &MqttConf,
        client_id: &str,
        subscriptions: Vec<(String, QoS)>,
    ) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let client_id = format!("{}-{}", client_id, std::process::id());
        let mut opts = MqttOptions::new(&client_id, &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs.max(5)));
        opts.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        let link = Arc::new(LinkState::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let loop_client = client.clone();
        let loop_link = link.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        loop_link.connected.store(true, Ordering::Relaxed);
                        info!("[bus] connected as {}", client_id);
                        for (topic, qos) in &subscriptions {
                            // try_subscribe: awaiting would block the loop draining requests
                            if let Err(e) = loop_client.try_subscribe(topic.clone(), *qos) {
                                error!("[bus] subscribe {} failed: {}", topic, e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        debug!("[bus] message on {} ({} bytes)", p.topic, p.payload.len());
                        let msg = InboundMessage {
                            topic: p.topic.clone(),
                            payload: p.payload.to_vec(),
                        };
                        if tx.send(msg).is_err() {
                            debug!("[bus] receiver dropped, stopping event loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if loop_link.connected.swap(false, Ordering::Relaxed) {
                            loop_link.reconnects.fetch_add(1, Ordering::Relaxed);
                        }
                        warn!("[bus] MQTT error: {}. Reconnecting...", e);
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        (Self { client, link }, rx)
    }

    pub fn reconnects(&self) -> u32 {
        self.link.reconnects.load(Ordering::Relaxed)
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("[bus] disconnect: {}", e);
        }
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}
