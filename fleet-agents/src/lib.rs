//! Fleet agents - the decision and action side of the pipeline
//!
//! - Rule agents (energy, maintenance, utilization) and the routing placeholder
//! - Dual-write action emitter (bus + durable log)
//! - Sequential runner over the inbound telemetry stream
//! - Periodic reporting aggregator
//! - Telemetry ingest into the durable log

pub mod agents;
pub mod emitter;
pub mod ingest;
pub mod reporting;
pub mod runner;

pub use agents::{parse_kind, Agent, AgentError, Decision, FleetAgent};
pub use emitter::{ActionEmitter, EmitOutcome};
pub use ingest::{IngestStats, Ingested, TelemetryIngest};
pub use reporting::ReportingAggregator;
pub use runner::{handle_message, run_agent, RunnerStats};
