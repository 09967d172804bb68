// Battery voltage sensing through the ADC and the resistor divider

use tracing::debug;

use crate::board::{AnalogInput, PeripheralError};
use crate::config::{ADC_FULL_SCALE, ADC_REFERENCE_VOLTAGE, DIVIDER_RATIO};

/// Linear calibration from a raw ADC count to battery volts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageCalibration {
    pub reference_voltage: f32,
    pub full_scale: f32,
    pub divider_ratio: f32,
}

impl Default for VoltageCalibration {
    fn default() -> Self {
        Self {
            reference_voltage: ADC_REFERENCE_VOLTAGE,
            full_scale: ADC_FULL_SCALE,
            divider_ratio: DIVIDER_RATIO,
        }
    }
}

impl VoltageCalibration {
    pub fn to_volts(&self, raw: u16) -> f32 {
        raw as f32 * self.reference_voltage / self.full_scale * self.divider_ratio
    }
}

/// Single-sample battery voltage estimate. Out-of-calibration values are passed through as-is.
pub struct VoltageSensor<A: AnalogInput> {
    adc: A,
    calibration: VoltageCalibration,
}

impl<A: AnalogInput> VoltageSensor<A> {
    pub fn new(adc: A, calibration: VoltageCalibration) -> Self {
        Self { adc, calibration }
    }

    pub fn calibration(&self) -> VoltageCalibration {
        self.calibration
    }

    pub fn read(&mut self) -> Result<f32, PeripheralError> {
        let raw = self.adc.read_raw()?;
        let volts = self.calibration.to_volts(raw);
        debug!("Battery sample: raw={}, volts={:.3}", raw, volts);
        Ok(volts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::SimBoard;

    #[test]
    fn test_known_sample() {
        let mut sensor = VoltageSensor::new(SimBoard::with_adc(2048), VoltageCalibration::default());
        let expected = 2048.0 * 3.3 / 4096.0 * (122.0 / 22.0);
        let volts = sensor.read().unwrap();
        assert!((volts - expected).abs() < 1e-4, "got {}, expected {}", volts, expected);
    }

    #[test]
    fn test_zero_and_full_scale() {
        let cal = VoltageCalibration::default();
        assert_eq!(cal.to_volts(0), 0.0);
        let full = cal.to_volts(4095);
        assert!((full - 4095.0 * 3.3 / 4096.0 * DIVIDER_RATIO).abs() < 1e-4);
    }

    #[test]
    fn test_custom_divider() {
        let cal = VoltageCalibration {
            divider_ratio: 1.0,
            ..VoltageCalibration::default()
        };
        assert!((cal.to_volts(4096) - 3.3).abs() < 1e-6);

        let mut sensor = VoltageSensor::new(SimBoard::with_adc(4096), cal);
        assert_eq!(sensor.calibration(), cal);
        assert!((sensor.read().unwrap() - 3.3).abs() < 1e-6);
    }

    #[test]
    fn test_adc_fault_propagates() {
        let board = SimBoard::with_adc(100);
        board.set_adc_fault(true);
        let mut sensor = VoltageSensor::new(board, VoltageCalibration::default());
        assert!(sensor.read().is_err());
    }
}
