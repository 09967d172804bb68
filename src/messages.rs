// Message types exchanged with teleop and telemetry consumers

use serde::{Deserialize, Serialize};

// Steering command from teleop -> runtime
// Both fields are nominally in [-1, 1]; senders don't enforce it, the mapper clamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SteeringCommand {
    pub linear: f32,
    pub angular: f32,
}

impl SteeringCommand {
    pub fn new(linear: f32, angular: f32) -> Self {
        Self { linear, angular }
    }
}

// Battery telemetry from runtime -> consumers, one per tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub voltage: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd: SteeringCommand = serde_json::from_str(r#"{"linear": 0.5, "angular": -1.0}"#).unwrap();
        assert_eq!(cmd, SteeringCommand::new(0.5, -1.0));
    }

    #[test]
    fn test_command_missing_field_rejected() {
        assert!(serde_json::from_str::<SteeringCommand>(r#"{"linear": 0.5}"#).is_err());
    }

    #[test]
    fn test_battery_wire_format() {
        let json = serde_json::to_string(&BatteryReading { voltage: 7.5 }).unwrap();
        assert_eq!(json, r#"{"voltage":7.5}"#);
    }
}
