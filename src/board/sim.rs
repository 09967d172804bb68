// In-memory bench board
//
// Stands in for the bridge when no serial port is configured. Clones share state,
// so a test can keep one handle while the control loop owns the others.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{AnalogInput, Channel, PeripheralError, PowerLatch, PwmBank};

#[derive(Debug, Default)]
struct SimState {
    staged: [u16; 4],
    live: [u16; 4],
    adc_raw: u16,
    power_held: bool,
    latches: usize,
    overlap_seen: bool,
    fail_adc: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimBoard {
    state: Arc<Mutex<SimState>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bench board whose ADC reports a fixed raw sample
    pub fn with_adc(raw: u16) -> Self {
        let board = Self::new();
        board.set_adc_raw(raw);
        board
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_adc_raw(&self, raw: u16) {
        self.state().adc_raw = raw;
    }

    /// Make every ADC read fail with a timeout until cleared
    pub fn set_adc_fault(&self, fail: bool) {
        self.state().fail_adc = fail;
    }

    /// Duty currently driving a pin
    pub fn live_duty(&self, channel: Channel) -> u16 {
        self.state().live[channel.index()]
    }

    pub fn live_duties(&self) -> [u16; 4] {
        self.state().live
    }

    pub fn power_held(&self) -> bool {
        self.state().power_held
    }

    /// Number of `update_duty` calls seen
    pub fn latch_count(&self) -> usize {
        self.state().latches
    }

    /// True if both channels of a side were ever live-nonzero at the same time
    pub fn overlap_seen(&self) -> bool {
        self.state().overlap_seen
    }
}

impl PwmBank for SimBoard {
    fn set_duty(&mut self, channel: Channel, duty: u16) -> Result<(), PeripheralError> {
        self.state().staged[channel.index()] = duty;
        Ok(())
    }

    fn update_duty(&mut self, channel: Channel) -> Result<(), PeripheralError> {
        let mut state = self.state();
        let i = channel.index();
        state.live[i] = state.staged[i];
        state.latches += 1;
        if state.live[i] != 0 && state.live[channel.opposite().index()] != 0 {
            state.overlap_seen = true;
        }
        Ok(())
    }
}

impl AnalogInput for SimBoard {
    fn read_raw(&mut self) -> Result<u16, PeripheralError> {
        let state = self.state();
        if state.fail_adc {
            return Err(PeripheralError::Timeout);
        }
        Ok(state.adc_raw)
    }
}

impl PowerLatch for SimBoard {
    fn hold_power(&mut self) -> Result<(), PeripheralError> {
        self.state().power_held = true;
        Ok(())
    }
}
