//! Telemetry ingest: `fleet/telemetry` messages become `vehicle_telemetry` points.

use fleet_core::{now_millis, InboundMessage, LogError, Telemetry, TimeSeriesLog, TELEMETRY_TOPIC};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    Written,
    /// Wrong topic, invalid payload or no metric at all
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub written: u64,
    pub skipped: u64,
    pub failures: u64,
}

pub struct TelemetryIngest {
    log: Arc<dyn TimeSeriesLog>,
}

impl TelemetryIngest {
    pub fn new(log: Arc<dyn TimeSeriesLog>) -> Self {
        Self { log }
    }

    /// Records without a timestamp are stored at `received_at`.
    pub async fn handle(
        &self,
        msg: &InboundMessage,
        received_at: i64,
    ) -> Result<Ingested, LogError> {
        if msg.topic != TELEMETRY_TOPIC {
            return Ok(Ingested::Skipped);
        }
        let telemetry = match Telemetry::from_slice(&msg.payload) {
            Ok(t) => t,
            Err(e) => {
                debug!("[ingest] skipping payload: {}", e);
                return Ok(Ingested::Skipped);
            }
        };
        if telemetry.is_empty() {
            debug!("[ingest] no metrics from {}", telemetry.vehicle_id);
            return Ok(Ingested::Skipped);
        }

        self.log.append(&telemetry.to_point(received_at)).await?;
        debug!("[ingest] stored telemetry for {}", telemetry.vehicle_id);
        Ok(Ingested::Written)
    }

    pub async fn run(
        &self,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> IngestStats {
        let mut stats = IngestStats::default();
        info!("[ingest] running");
        loop {
            tokio::select! {
                msg = inbound.recv() => {
                    let Some(msg) = msg else {
                        info!("[ingest] inbound stream closed");
                        break;
                    };
                    match self.handle(&msg, now_millis()).await {
                        Ok(Ingested::Written) => stats.written += 1,
                        Ok(Ingested::Skipped) => stats.skipped += 1,
                        Err(e) => {
                            stats.failures += 1;
                            error!("[ingest] write failed: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("[ingest] shutdown requested");
                    break;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FieldValue;
    use fleet_devkit::{MemoryLog, TelemetryBuilder};

    fn telemetry_msg(payload: Vec<u8>) -> InboundMessage {
        InboundMessage {
            topic: TELEMETRY_TOPIC.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn test_writes_present_fields_only() {
        let log = MemoryLog::new();
        let ingest = TelemetryIngest::new(Arc::new(log.clone()));
        let payload = TelemetryBuilder::new("v1")
            .timestamp(123)
            .speed(42.0)
            .fuel_level(60.0)
            .to_payload();

        let result = ingest.handle(&telemetry_msg(payload), 999).await.unwrap();
        assert_eq!(result, Ingested::Written);

        let points = log.points_in("vehicle_telemetry");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, 123);
        assert_eq!(points[0].tags.get("vehicle_id").map(String::as_str), Some("v1"));
        assert_eq!(points[0].fields.get("speed"), Some(&FieldValue::Float(42.0)));
        assert!(!points[0].fields.contains_key("engine_temp"));
    }

    #[tokio::test]
    async fn test_missing_timestamp_uses_receive_time() {
        let log = MemoryLog::new();
        let ingest = TelemetryIngest::new(Arc::new(log.clone()));
        let payload = TelemetryBuilder::new("v1").tire_pressure(33.0).to_payload();
        ingest.handle(&telemetry_msg(payload), 999).await.unwrap();
        assert_eq!(log.points()[0].timestamp, 999);
    }

    #[tokio::test]
    async fn test_skips_unusable_messages() {
        let log = MemoryLog::new();
        let ingest = TelemetryIngest::new(Arc::new(log.clone()));

        let empty = TelemetryBuilder::new("v1").timestamp(5).to_payload();
        for payload in [empty, b"[]".to_vec()] {
            let result = ingest.handle(&telemetry_msg(payload), 1).await.unwrap();
            assert_eq!(result, Ingested::Skipped);
        }
        assert!(log.points().is_empty());
    }

    #[tokio::test]
    async fn test_run_counts_failures() {
        let log = MemoryLog::new();
        log.set_fail_appends(true);
        let ingest = TelemetryIngest::new(Arc::new(log.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        tx.send(telemetry_msg(TelemetryBuilder::new("v1").speed(1.0).to_payload())).unwrap();
        tx.send(telemetry_msg(b"nope".to_vec())).unwrap();
        drop(tx);

        let stats = ingest.run(rx, stop_rx).await;
        assert_eq!(stats, IngestStats { written: 0, skipped: 1, failures: 1 });
    }
}
