//! Dual write of actions: bus topic + `agent_action` log record.

use fleet_core::{Action, BusError, MessageBus, TimeSeriesLog};
use std::sync::Arc;
use tracing::{error, info};

/// Result of one dual write. Each side fails on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOutcome {
    pub published: bool,
    pub logged: bool,
}

impl EmitOutcome {
    pub fn is_complete(&self) -> bool {
        self.published && self.logged
    }

    /// Number of writes that failed (0-2).
    pub fn failures(&self) -> u64 {
        u64::from(!self.published) + u64::from(!self.logged)
    }
}

#[derive(Clone)]
pub struct ActionEmitter {
    bus: Arc<dyn MessageBus>,
    log: Arc<dyn TimeSeriesLog>,
}

impl ActionEmitter {
    pub fn new(bus: Arc<dyn MessageBus>, log: Arc<dyn TimeSeriesLog>) -> Self {
        Self { bus, log }
    }

    /// Publishes and appends concurrently; returns once both attempts finished.
    /// Nothing is retried here.
    pub async fn emit(&self, action: &Action) -> EmitOutcome {
        let topic = action.topic();
        let point = action.to_point();

        let publish = async {
            let payload = serde_json::to_vec(action)?;
            self.bus.publish(&topic, payload).await?;
            Ok::<(), BusError>(())
        };
        let (published, logged) = tokio::join!(publish, self.log.append(&point));

        if let Err(e) = &published {
            error!("[emitter] publish to {} failed: {}", topic, e);
        }
        if let Err(e) = &logged {
            error!(
                "[emitter] log append for {} {} failed: {}",
                action.vehicle_id,
                action.type_name(),
                e
            );
        }

        let outcome = EmitOutcome {
            published: published.is_ok(),
            logged: logged.is_ok(),
        };
        info!(
            "[emitter] {} -> {} {} (published={}, logged={})",
            action.agent,
            action.vehicle_id,
            action.type_name(),
            outcome.published,
            outcome.logged
        );
        outcome
    }
}
