// Telemetry output seam: the control loop hands each battery reading to a sink

use crate::error::ControlError;
use crate::messages::BatteryReading;

/// Destination for per-tick battery readings.
#[allow(async_fn_in_trait)]
pub trait TelemetrySink {
    async fn publish(&self, reading: &BatteryReading) -> Result<(), ControlError>;
}

/// Publishes readings as JSON on a Zenoh key expression
pub struct ZenohTelemetry<'a> {
    publisher: zenoh::pubsub::Publisher<'a>,
}

impl<'a> ZenohTelemetry<'a> {
    pub fn new(publisher: zenoh::pubsub::Publisher<'a>) -> Self {
        Self { publisher }
    }
}

impl TelemetrySink for ZenohTelemetry<'_> {
    async fn publish(&self, reading: &BatteryReading) -> Result<(), ControlError> {
        let json = serde_json::to_string(reading)?;
        self.publisher.put(json).await.map_err(ControlError::Publish)
    }
}
