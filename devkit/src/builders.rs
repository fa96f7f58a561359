/*!
Telemetry builders for tests

Fluent construction of `Telemetry` records and raw `fleet/telemetry` payloads.
*/

use fleet_core::Telemetry;

pub struct TelemetryBuilder {
    telemetry: Telemetry,
}

impl TelemetryBuilder {
    pub fn new<S: Into<String>>(vehicle_id: S) -> Self {
        Self {
            telemetry: Telemetry::new(vehicle_id),
        }
    }

    pub fn timestamp(mut self, millis: i64) -> Self {
        self.telemetry.timestamp = Some(millis);
        self
    }

    pub fn speed(mut self, value: f64) -> Self {
        self.telemetry.speed = Some(value);
        self
    }

    pub fn engine_temp(mut self, value: f64) -> Self {
        self.telemetry.engine_temp = Some(value);
        self
    }

    pub fn fuel_level(mut self, value: f64) -> Self {
        self.telemetry.fuel_level = Some(value);
        self
    }

    pub fn tire_pressure(mut self, value: f64) -> Self {
        self.telemetry.tire_pressure = Some(value);
        self
    }

    /// Every metric set to the given values
    pub fn full(
        vehicle_id: &str,
        speed: f64,
        engine_temp: f64,
        fuel_level: f64,
        tire_pressure: f64,
    ) -> Telemetry {
        Self::new(vehicle_id)
            .speed(speed)
            .engine_temp(engine_temp)
            .fuel_level(fuel_level)
            .tire_pressure(tire_pressure)
            .build()
    }

    pub fn build(self) -> Telemetry {
        self.telemetry
    }

    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(&self.telemetry).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let t = TelemetryBuilder::new("v1").speed(15.0).fuel_level(10.0).build();
        assert_eq!(t.vehicle_id, "v1");
        assert_eq!(t.speed, Some(15.0));
        assert_eq!(t.fuel_level, Some(10.0));
        assert_eq!(t.engine_temp, None);
    }

    #[test]
    fn test_payload_parses_back() {
        // as a vehicle sends it
        let payload = br#"{
            "vehicle_id": "v2",
            "timestamp": 1,
            "speed": 60.0,
            "engine_temp": 80.0,
            "fuel_level": 50.0,
            "tire_pressure": 33.0
        }"#;
        let expected = TelemetryBuilder::new("v2")
            .timestamp(1)
            .speed(60.0)
            .engine_temp(80.0)
            .fuel_level(50.0)
            .tire_pressure(33.0)
            .build();
        assert_eq!(Telemetry::from_slice(payload).unwrap(), expected);
    }
}
