/*!
# Fleet DevKit - stubs and utilities for development

Test support for the fleet agents:
- Mock message bus (no broker needed)
- In-memory durable log
- Telemetry builders
- Harness with dual-write assertions
*/

pub mod builders;
pub mod memory_log;
pub mod mqtt_stub;
pub mod test_utils;

pub use builders::TelemetryBuilder;
pub use memory_log::MemoryLog;
pub use mqtt_stub::MockBus;
pub use test_utils::TestHarness;
