/**
 * DURABLE LOG - append-only time-series store used as system of record
 *
 * ROLE :
 * Common interface over the store holding `vehicle_telemetry`, `agent_action`
 * and `agent_summary` records. Writers only append; readers filter by
 * measurement/tag, time range, group-by-tag counts, last value and sort+limit.
 *
 * OPERATION :
 * - Point   = one record to write (measurement + tags + typed fields + time)
 * - Record  = one flattened row returned by a query
 * - TimeSeriesLog trait = append / query / count_by_tag / last_by_tag
 *
 * Implementations: `InfluxLog` (production), `MemoryLog` in the devkit (tests).
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("log rejected request ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("cannot encode point: {0}")]
    Encode(String),
    #[error("cannot decode query result: {0}")]
    Decode(String),
    #[error("log unavailable: {0}")]
    Unavailable(String),
}

/// Typed field value, serialized as the bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One tagged, timestamped record to append.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Milliseconds since epoch.
    pub timestamp: i64,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Flattened query row: tags and fields share one map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub time: i64,
    pub measurement: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(FieldValue::as_str)
    }
}

impl From<&Point> for Record {
    fn from(point: &Point) -> Self {
        let mut values: BTreeMap<String, FieldValue> = point
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::Str(v.clone())))
            .collect();
        values.extend(point.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            time: point.timestamp,
            measurement: point.measurement.clone(),
            values,
        }
    }
}

/// Half-open time window `[start, stop)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub stop: i64,
}

impl TimeRange {
    pub fn new(start: i64, stop: i64) -> Self {
        Self { start, stop }
    }

    /// The `length` long window ending (exclusive) at `now`.
    pub fn trailing(now: i64, length: Duration) -> Self {
        let len = i64::try_from(length.as_millis()).unwrap_or(i64::MAX);
        Self {
            start: now.saturating_sub(len),
            stop: now,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.stop
    }
}

/// Filtered read over one measurement.
#[derive(Debug, Clone)]
pub struct PointQuery {
    pub measurement: String,
    /// Exact-match tag filters.
    pub tags: BTreeMap<String, String>,
    pub range: TimeRange,
    /// Newest first when true, oldest first otherwise.
    pub descending: bool,
    pub limit: Option<usize>,
}

impl PointQuery {
    pub fn new(measurement: impl Into<String>, range: TimeRange) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            range,
            descending: false,
            limit: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.descending = true;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Interface shared by every durable log backend.
#[async_trait]
pub trait TimeSeriesLog: Send + Sync {
    /// Appends one point. Never updates or deletes.
    async fn append(&self, point: &Point) -> Result<(), LogError>;

    async fn query(&self, query: &PointQuery) -> Result<Vec<Record>, LogError>;

    /// Number of `measurement` points carrying `field` inside `range`,
    /// grouped by the value of `tag`.
    async fn count_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        field: &str,
        range: TimeRange,
    ) -> Result<BTreeMap<String, u64>, LogError>;

    /// Latest value of every field for each distinct `tag` value in `range`.
    async fn last_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        range: TimeRange,
    ) -> Result<Vec<Record>, LogError>;
}
