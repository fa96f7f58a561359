/*!
In-memory durable log

`TimeSeriesLog` over a `Vec<Point>`, honoring the same half-open time ranges,
tag filters, ordering and limits as the InfluxDB backend. Like InfluxDB, a
point is identified by measurement, tag set and timestamp: writing the same
key again merges into the stored field set instead of adding a row. Appends
and reads can be made to fail independently.
*/

use async_trait::async_trait;
use fleet_core::{LogError, Point, PointQuery, Record, TimeRange, TimeSeriesLog};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryLog {
    points: Arc<Mutex<Vec<Point>>>,
    fail_appends: Arc<AtomicBool>,
    fail_queries: Arc<AtomicBool>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_appends(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::Relaxed);
    }

    pub fn set_fail_queries(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::Relaxed);
    }

    /// Seeds a point directly, bypassing failure injection
    pub fn insert(&self, point: Point) {
        let mut points = self.points.lock();
        let existing = points.iter_mut().find(|p| {
            p.measurement == point.measurement
                && p.timestamp == point.timestamp
                && p.tags == point.tags
        });
        match existing {
            Some(stored) => stored.fields.extend(point.fields),
            None => points.push(point),
        }
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }

    pub fn points_in(&self, measurement: &str) -> Vec<Point> {
        self.points
            .lock()
            .iter()
            .filter(|p| p.measurement == measurement)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.points.lock().clear();
    }

    fn check_queries(&self) -> Result<(), LogError> {
        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(LogError::Unavailable("memory log set to fail queries".into()));
        }
        Ok(())
    }

    fn select(&self, measurement: &str, range: TimeRange) -> Vec<Point> {
        self.points
            .lock()
            .iter()
            .filter(|p| p.measurement == measurement && range.contains(p.timestamp))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TimeSeriesLog for MemoryLog {
    async fn append(&self, point: &Point) -> Result<(), LogError> {
        if self.fail_appends.load(Ordering::Relaxed) {
            return Err(LogError::Unavailable("memory log set to fail appends".into()));
        }
        self.insert(point.clone());
        Ok(())
    }

    async fn query(&self, query: &PointQuery) -> Result<Vec<Record>, LogError> {
        self.check_queries()?;
        let mut points: Vec<Point> = self
            .select(&query.measurement, query.range)
            .into_iter()
            .filter(|p| {
                query
                    .tags
                    .iter()
                    .all(|(k, v)| p.tags.get(k).map(|t| t == v).unwrap_or(false))
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        if query.descending {
            points.reverse();
        }
        if let Some(n) = query.limit {
            points.truncate(n);
        }
        Ok(points.iter().map(Record::from).collect())
    }

    async fn count_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        field: &str,
        range: TimeRange,
    ) -> Result<BTreeMap<String, u64>, LogError> {
        self.check_queries()?;
        let mut counts = BTreeMap::new();
        for point in self.select(measurement, range) {
            if !point.fields.contains_key(field) {
                continue;
            }
            if let Some(value) = point.tags.get(tag) {
                *counts.entry(value.clone()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn last_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        range: TimeRange,
    ) -> Result<Vec<Record>, LogError> {
        self.check_queries()?;
        let mut latest: BTreeMap<String, Point> = BTreeMap::new();
        for point in self.select(measurement, range) {
            let Some(key) = point.tags.get(tag).cloned() else { continue };
            match latest.get(&key) {
                Some(existing) if existing.timestamp > point.timestamp => {}
                _ => {
                    latest.insert(key, point);
                }
            }
        }
        Ok(latest.values().map(Record::from).collect())
    }
}
