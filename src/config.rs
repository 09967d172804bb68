// Tick period, topics, duty range, calibration
use std::time::Duration;

use clap::Parser;

use crate::board::Channel;
use crate::drive::DutyRange;
use crate::error::ControlError;
use crate::sensor::VoltageCalibration;

// Control loop period (10 Hz)
pub const TICK_PERIOD_MS: u64 = 100;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "diffbot/cmd_vel"; // steering commands
pub const TOPIC_BATTERY: &str = "diffbot/battery"; // battery telemetry

// PWM outputs: 10-bit duty, one shared ~30 Hz timer
pub const PWM_RESOLUTION_BITS: u32 = 10;
pub const PWM_DUTY_CEILING: u16 = (1 << PWM_RESOLUTION_BITS) - 1;
pub const PWM_FREQ_HZ: u32 = 30;

// Duty range the kinematic mapper scales |v| into
pub const DUTY_MIN: u16 = 0;
pub const DUTY_MAX: u16 = PWM_DUTY_CEILING;

// Battery sense: 12-bit ADC behind a 100k/22k divider
pub const ADC_FULL_SCALE: f32 = 4096.0;
pub const ADC_REFERENCE_VOLTAGE: f32 = 3.3;
pub const DIVIDER_HIGH_OHMS: f32 = 100_000.0;
pub const DIVIDER_LOW_OHMS: f32 = 22_000.0;
pub const DIVIDER_RATIO: f32 = (DIVIDER_HIGH_OHMS + DIVIDER_LOW_OHMS) / DIVIDER_LOW_OHMS;

// Bridge channel map. Order matches the board's PWM channel numbering.
pub const CHANNEL_MAP: [(Channel, u8); 4] = [
    (Channel::RightForward, 0),
    (Channel::RightBackward, 1),
    (Channel::LeftForward, 2),
    (Channel::LeftBackward, 3),
];

/// Command line options for the control runtime.
#[derive(Debug, Clone, Parser)]
#[command(version, about = "Differential-drive control core: cmd_vel in, battery voltage out")]
pub struct Args {
    /// Control tick period in milliseconds
    #[arg(long, default_value_t = TICK_PERIOD_MS)]
    pub tick_ms: u64,

    /// Topic carrying steering commands
    #[arg(long, default_value = TOPIC_CMD_VEL)]
    pub cmd_topic: String,

    /// Topic battery readings are published on
    #[arg(long, default_value = TOPIC_BATTERY)]
    pub battery_topic: String,

    /// Serial port of the I/O bridge board. Runs on the simulated bench board when omitted.
    #[arg(long)]
    pub port: Option<String>,

    /// Duty applied at the smallest nonzero wheel speed
    #[arg(long, default_value_t = DUTY_MIN)]
    pub duty_min: u16,

    /// Duty applied at full wheel speed
    #[arg(long, default_value_t = DUTY_MAX)]
    pub duty_max: u16,

    /// Battery divider ratio (Vbatt / Vadc)
    #[arg(long, default_value_t = DIVIDER_RATIO)]
    pub divider_ratio: f32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            tick_ms: TICK_PERIOD_MS,
            cmd_topic: TOPIC_CMD_VEL.to_string(),
            battery_topic: TOPIC_BATTERY.to_string(),
            port: None,
            duty_min: DUTY_MIN,
            duty_max: DUTY_MAX,
            divider_ratio: DIVIDER_RATIO,
        }
    }
}

impl Args {
    pub fn tick_period(&self) -> Result<Duration, ControlError> {
        if self.tick_ms == 0 {
            return Err(ControlError::Config("tick period must be nonzero".to_string()));
        }
        Ok(Duration::from_millis(self.tick_ms))
    }

    pub fn duty_range(&self) -> Result<DutyRange, ControlError> {
        DutyRange::new(self.duty_min, self.duty_max)
    }

    pub fn calibration(&self) -> Result<VoltageCalibration, ControlError> {
        if !(self.divider_ratio.is_finite() && self.divider_ratio > 0.0) {
            return Err(ControlError::Config(format!(
                "divider ratio must be positive, got {}",
                self.divider_ratio
            )));
        }
        Ok(VoltageCalibration {
            divider_ratio: self.divider_ratio,
            ..VoltageCalibration::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let args = Args::default();
        assert_eq!(args.tick_period().unwrap(), Duration::from_millis(100));
        let range = args.duty_range().unwrap();
        assert_eq!(range.min(), 0);
        assert_eq!(range.max(), 1023);
        assert!(args.calibration().is_ok());
    }

    #[test]
    fn test_divider_ratio_from_resistors() {
        assert!((DIVIDER_RATIO - 122.0 / 22.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([
            "diffbot-runtime",
            "--tick-ms",
            "50",
            "--duty-min",
            "200",
            "--port",
            "/dev/ttyUSB0",
        ]);
        assert_eq!(args.tick_ms, 50);
        assert_eq!(args.duty_min, 200);
        assert_eq!(args.duty_max, DUTY_MAX);
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.cmd_topic, TOPIC_CMD_VEL);
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        let zero_tick = Args {
            tick_ms: 0,
            ..Args::default()
        };
        assert!(zero_tick.tick_period().unwrap_err().is_fatal());

        let inverted = Args {
            duty_min: 900,
            duty_max: 100,
            ..Args::default()
        };
        assert!(inverted.duty_range().unwrap_err().is_fatal());

        let bad_divider = Args {
            divider_ratio: 0.0,
            ..Args::default()
        };
        assert!(bad_divider.calibration().unwrap_err().is_fatal());
    }
}
