/*!
 * Dashboard API - read-only HTTP view of the durable log
 *
 * Routes:
 * - GET /health                        liveness
 * - GET /api/vehicles                  latest telemetry per vehicle (last 10 min)
 * - GET /api/vehicle/{id}/timeseries   one vehicle, last hour, oldest first
 * - GET /api/actions                   last 100 actions of the last 24 h, newest first
 *
 * Log failures map to 502; the log is the only upstream.
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use fleet_core::{now_millis, FieldValue, PointQuery, Record, TimeRange, TimeSeriesLog};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

const VEHICLES_WINDOW: Duration = Duration::from_secs(10 * 60);
const TIMESERIES_WINDOW: Duration = Duration::from_secs(60 * 60);
const ACTIONS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
const ACTIONS_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub log: Arc<dyn TimeSeriesLog>,
}

/// One log row as the dashboard sees it: RFC3339 time + tags and fields.
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub timestamp: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, FieldValue>,
}

fn to_view(record: Record) -> RecordView {
    let timestamp = DateTime::<Utc>::from_timestamp_millis(record.time)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default();
    RecordView {
        timestamp,
        values: record.values,
    }
}

fn upstream_error(route: &str, e: fleet_core::LogError) -> StatusCode {
    error!("[dashboard] {} failed: {}", route, e);
    StatusCode::BAD_GATEWAY
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/vehicles", get(get_vehicles))
        .route("/api/vehicle/{id}/timeseries", get(get_vehicle_timeseries))
        .route("/api/actions", get(get_actions))
        .with_state(app_state)
}

pub async fn get_vehicles(
    State(app): State<AppState>,
) -> Result<Json<Vec<RecordView>>, StatusCode> {
    let range = TimeRange::trailing(now_millis(), VEHICLES_WINDOW);
    let rows = app
        .log
        .last_by_tag("vehicle_telemetry", "vehicle_id", range)
        .await
        .map_err(|e| upstream_error("/api/vehicles", e))?;
    Ok(Json(rows.into_iter().map(to_view).collect()))
}

pub async fn get_vehicle_timeseries(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RecordView>>, StatusCode> {
    let query = PointQuery::new(
        "vehicle_telemetry",
        TimeRange::trailing(now_millis(), TIMESERIES_WINDOW),
    )
    .with_tag("vehicle_id", id);
    let rows = app
        .log
        .query(&query)
        .await
        .map_err(|e| upstream_error("/api/vehicle/{id}/timeseries", e))?;
    Ok(Json(rows.into_iter().map(to_view).collect()))
}

pub async fn get_actions(
    State(app): State<AppState>,
) -> Result<Json<Vec<RecordView>>, StatusCode> {
    let query = PointQuery::new("agent_action", TimeRange::trailing(now_millis(), ACTIONS_WINDOW))
        .newest_first()
        .limit(ACTIONS_LIMIT);
    let rows = app
        .log
        .query(&query)
        .await
        .map_err(|e| upstream_error("/api/actions", e))?;
    Ok(Json(rows.into_iter().map(to_view).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Point;
    use fleet_devkit::MemoryLog;

    fn state(log: &MemoryLog) -> State<AppState> {
        State(AppState {
            log: Arc::new(log.clone()),
        })
    }

    fn telemetry(vehicle: &str, ts: i64, speed: f64) -> Point {
        Point::new("vehicle_telemetry", ts)
            .tag("vehicle_id", vehicle)
            .field("speed", FieldValue::Float(speed))
    }

    #[tokio::test]
    async fn test_vehicles_returns_latest_per_vehicle() {
        let log = MemoryLog::new();
        let now = now_millis();
        log.insert(telemetry("v1", now - 60_000, 40.0));
        log.insert(telemetry("v1", now - 1_000, 55.0));
        log.insert(telemetry("v2", now - 2_000, 70.0));
        // older than ten minutes
        log.insert(telemetry("v3", now - 11 * 60_000, 10.0));

        let Json(rows) = get_vehicles(state(&log)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values.get("vehicle_id"), Some(&FieldValue::Str("v1".into())));
        assert_eq!(rows[0].values.get("speed"), Some(&FieldValue::Float(55.0)));
        assert!(rows[0].timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_timeseries_is_one_vehicle_oldest_first() {
        let log = MemoryLog::new();
        let now = now_millis();
        log.insert(telemetry("v1", now - 1_000, 3.0));
        log.insert(telemetry("v1", now - 3_000, 1.0));
        log.insert(telemetry("v2", now - 2_000, 9.0));
        log.insert(telemetry("v1", now - 2 * 3_600_000, 0.0));

        let Json(rows) = get_vehicle_timeseries(state(&log), Path("v1".to_string()))
            .await
            .unwrap();
        let speeds: Vec<_> = rows.iter().filter_map(|r| r.values.get("speed")).collect();
        assert_eq!(speeds, vec![&FieldValue::Float(1.0), &FieldValue::Float(3.0)]);
    }

    #[tokio::test]
    async fn test_actions_newest_first_and_capped() {
        let log = MemoryLog::new();
        let now = now_millis();
        for i in 0..120 {
            log.insert(
                Point::new("agent_action", now - 10_000 - i)
                    .tag("agent", "EnergyAgent")
                    .tag("vehicle_id", "v1")
                    .field("type", FieldValue::Str("charge_schedule".into())),
            );
        }
        let Json(rows) = get_actions(state(&log)).await.unwrap();
        assert_eq!(rows.len(), ACTIONS_LIMIT);
        assert!(rows[0].timestamp >= rows[1].timestamp);
    }

    #[tokio::test]
    async fn test_log_failure_is_bad_gateway() {
        let log = MemoryLog::new();
        log.set_fail_queries(true);
        assert_eq!(get_actions(state(&log)).await.unwrap_err(), StatusCode::BAD_GATEWAY);
    }
}
