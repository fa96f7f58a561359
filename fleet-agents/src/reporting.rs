//! Reporting aggregator
//!
//! Every `interval`, counts the `agent_action` records of the trailing window
//! per agent and appends one `agent_summary` point per agent with actions.
//! A failed cycle is logged and dropped; the next one covers its own window
//! only.

use chrono::{DateTime, Utc};
use fleet_core::{now_millis, AgentSummary, LogError, TimeRange, TimeSeriesLog};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct ReportingAggregator {
    log: Arc<dyn TimeSeriesLog>,
    interval: Duration,
}

impl ReportingAggregator {
    pub fn new(log: Arc<dyn TimeSeriesLog>, interval: Duration) -> Self {
        Self { log, interval }
    }

    /// One cycle over `[now - interval, now)`. Stops at the first failure.
    pub async fn aggregate_at(&self, now: i64) -> Result<Vec<AgentSummary>, LogError> {
        let window = TimeRange::trailing(now, self.interval);
        debug!(
            "[reporting] window {} .. {}",
            format_millis(window.start),
            format_millis(window.stop)
        );

        // one `type` field per action, so each record counts once
        let counts = self
            .log
            .count_by_tag("agent_action", "agent", "type", window)
            .await?;

        let mut summaries = Vec::with_capacity(counts.len());
        for (agent, count) in counts {
            if count == 0 {
                continue;
            }
            let summary = AgentSummary {
                agent,
                count,
                timestamp: now,
            };
            self.log.append(&summary.to_point()).await?;
            info!("[reporting] summary {}: {}", summary.agent, summary.count);
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Aggregates now, then after every full interval. Never returns.
    pub async fn run(&self) {
        info!("[reporting] started, interval {}s", self.interval.as_secs());
        loop {
            if let Err(e) = self.aggregate_at(now_millis()).await {
                error!("[reporting] cycle failed: {}", e);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
