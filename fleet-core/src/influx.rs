/**
 * INFLUX LOG - InfluxDB v2 backend for the durable log
 *
 * ROLE :
 * Implements `TimeSeriesLog` over the InfluxDB v2 HTTP API.
 *
 * OPERATION :
 * - append : POST /api/v2/write (line protocol, ms precision)
 * - reads  : POST /api/v2/query (Flux), annotated CSV response decoded
 *            into `Record`s using the `#datatype` row for typing
 *
 * The request timeout comes from configuration; nothing is retried here.
 */

use crate::config::InfluxConf;
use crate::log::{FieldValue, LogError, Point, PointQuery, Record, TimeRange, TimeSeriesLog};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

pub struct InfluxLog {
    http: reqwest::Client,
    conf: InfluxConf,
}

impl InfluxLog {
    pub fn new(conf: InfluxConf) -> Result<Self, LogError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(conf.timeout_ms))
            .build()?;
        Ok(Self { http, conf })
    }

    pub fn bucket(&self) -> &str {
        &self.conf.bucket
    }

    async fn write_lines(&self, body: String) -> Result<(), LogError> {
        let resp = self
            .http
            .post(format!("{}/api/v2/write", self.conf.url))
            .query(&[
                ("org", self.conf.org.as_str()),
                ("bucket", self.conf.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Authorization", format!("Token {}", self.conf.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }

    async fn run_flux(&self, flux: String) -> Result<Vec<Record>, LogError> {
        debug!("[influx] query: {}", flux);
        let body = serde_json::json!({
            "query": flux,
            "type": "flux",
            "dialect": { "header": true, "annotations": ["datatype"], "delimiter": "," }
        });
        let resp = self
            .http
            .post(format!("{}/api/v2/query", self.conf.url))
            .query(&[("org", self.conf.org.as_str())])
            .header("Authorization", format!("Token {}", self.conf.token))
            .header("Accept", "application/csv")
            .json(&body)
            .send()
            .await?;
        let text = check_status(resp).await?;
        parse_annotated_csv(&text)
    }

    fn flux_source(&self, measurement: &str, range: TimeRange) -> String {
        format!(
            "from(bucket: \"{}\")\n  |> range(start: {}, stop: {})\n  |> filter(fn: (r) => r._measurement == \"{}\")",
            flux_escape(&self.conf.bucket),
            flux_time(range.start),
            flux_time(range.stop),
            flux_escape(measurement),
        )
    }
}

async fn check_status(resp: reqwest::Response) -> Result<String, LogError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(LogError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl TimeSeriesLog for InfluxLog {
    async fn append(&self, point: &Point) -> Result<(), LogError> {
        let line = to_line_protocol(point)?;
        self.write_lines(line).await
    }

    async fn query(&self, query: &PointQuery) -> Result<Vec<Record>, LogError> {
        let mut flux = self.flux_source(&query.measurement, query.range);
        for (key, value) in &query.tags {
            let _ = write!(
                flux,
                "\n  |> filter(fn: (r) => r[\"{}\"] == \"{}\")",
                flux_escape(key),
                flux_escape(value)
            );
        }
        flux.push_str("\n  |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")");
        flux.push_str("\n  |> group()");
        let _ = write!(
            flux,
            "\n  |> sort(columns: [\"_time\"], desc: {})",
            query.descending
        );
        if let Some(n) = query.limit {
            let _ = write!(flux, "\n  |> limit(n: {})", n);
        }
        self.run_flux(flux).await
    }

    async fn count_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        field: &str,
        range: TimeRange,
    ) -> Result<BTreeMap<String, u64>, LogError> {
        let mut flux = self.flux_source(measurement, range);
        // one row per point: count a single field, not every field of the point
        let _ = write!(
            flux,
            "\n  |> filter(fn: (r) => r._field == \"{}\")\n  |> group(columns: [\"{}\"])\n  |> count()",
            flux_escape(field),
            flux_escape(tag)
        );
        let rows = self.run_flux(flux).await?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let Some(key) = row.get_str(tag) else { continue };
            let count = match row.get("_value") {
                Some(FieldValue::Integer(n)) => u64::try_from(*n).unwrap_or(0),
                other => {
                    return Err(LogError::Decode(format!("unexpected count value {:?}", other)))
                }
            };
            *counts.entry(key.to_string()).or_insert(0) += count;
        }
        Ok(counts)
    }

    async fn last_by_tag(
        &self,
        measurement: &str,
        tag: &str,
        range: TimeRange,
    ) -> Result<Vec<Record>, LogError> {
        let mut flux = self.flux_source(measurement, range);
        let _ = write!(
            flux,
            "\n  |> pivot(rowKey: [\"_time\"], columnKey: [\"_field\"], valueColumn: \"_value\")\n  |> group(columns: [\"{}\"])\n  |> sort(columns: [\"_time\"])\n  |> last(column: \"_time\")",
            flux_escape(tag)
        );
        self.run_flux(flux).await
    }
}

// ===== Line protocol =====

fn escape_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_measurement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_string_field(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Encodes one point as an InfluxDB line (ms precision).
pub fn to_line_protocol(point: &Point) -> Result<String, LogError> {
    let mut line = escape_measurement(&point.measurement);
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }

    let mut fields = Vec::with_capacity(point.fields.len());
    for (key, value) in &point.fields {
        let encoded = match value {
            FieldValue::Float(v) if !v.is_finite() => continue,
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Str(s) => format!("\"{}\"", escape_string_field(s)),
        };
        fields.push(format!("{}={}", escape_key(key), encoded));
    }
    if fields.is_empty() {
        return Err(LogError::Encode(format!(
            "point for {} has no writable field",
            point.measurement
        )));
    }

    let _ = write!(line, " {} {}", fields.join(","), point.timestamp);
    Ok(line)
}

// ===== Flux helpers =====

fn flux_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn flux_time(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => "1970-01-01T00:00:00.000Z".to_string(),
    }
}

// ===== Annotated CSV =====

fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn decode_cell(datatype: &str, raw: &str) -> Result<FieldValue, LogError> {
    let bad = || LogError::Decode(format!("cannot read {:?} as {}", raw, datatype));
    Ok(match datatype {
        "long" | "unsignedLong" => FieldValue::Integer(raw.parse().map_err(|_| bad())?),
        "double" => FieldValue::Float(raw.parse().map_err(|_| bad())?),
        "boolean" => FieldValue::Bool(raw.parse().map_err(|_| bad())?),
        _ => FieldValue::Str(raw.to_string()),
    })
}

fn parse_time(raw: &str) -> Result<i64, LogError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp_millis())
        .map_err(|e| LogError::Decode(format!("bad _time {:?}: {}", raw, e)))
}

const SKIPPED_COLUMNS: [&str; 5] = ["", "result", "table", "_start", "_stop"];

/// Decodes an InfluxDB annotated CSV response (datatype annotation + header).
/// Tables are separated by blank lines and may each carry their own schema.
pub fn parse_annotated_csv(text: &str) -> Result<Vec<Record>, LogError> {
    let mut records = Vec::new();
    let mut datatypes: Vec<String> = Vec::new();
    let mut header: Option<Vec<String>> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            header = None;
            datatypes.clear();
            continue;
        }
        let cells = split_csv_line(line);
        if cells.first().map(|c| c.starts_with('#')).unwrap_or(false) {
            if cells[0] == "#datatype" {
                datatypes = cells;
            }
            header = None;
            continue;
        }
        let Some(columns) = header.as_ref() else {
            header = Some(cells);
            continue;
        };

        let mut record = Record {
            time: 0,
            measurement: String::new(),
            values: BTreeMap::new(),
        };
        for (idx, cell) in cells.iter().enumerate() {
            let Some(name) = columns.get(idx) else { break };
            if SKIPPED_COLUMNS.contains(&name.as_str()) || cell.is_empty() {
                continue;
            }
            match name.as_str() {
                "_time" => record.time = parse_time(cell)?,
                "_measurement" => record.measurement = cell.clone(),
                _ => {
                    let datatype = datatypes.get(idx).map(String::as_str).unwrap_or("string");
                    record.values.insert(name.clone(), decode_cell(datatype, cell)?);
                }
            }
        }
        records.push(record);
    }
    Ok(records)
}
