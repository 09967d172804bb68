// Peripheral seam for the control core
//
// Provides:
// - Traits for the duty-cycle outputs, the battery ADC and the power latch
// - Serial I/O bridge backend (real hardware)
// - In-memory bench backend (no hardware, used by tests and --port-less runs)

pub mod bridge;
pub mod sim;

pub use bridge::SerialBridge;
pub use sim::SimBoard;

/// One of the four duty-cycle outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LeftForward,
    LeftBackward,
    RightForward,
    RightBackward,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::LeftForward,
        Channel::LeftBackward,
        Channel::RightForward,
        Channel::RightBackward,
    ];

    pub fn index(self) -> usize {
        match self {
            Channel::LeftForward => 0,
            Channel::LeftBackward => 1,
            Channel::RightForward => 2,
            Channel::RightBackward => 3,
        }
    }

    /// The other channel on the same side.
    pub fn opposite(self) -> Channel {
        match self {
            Channel::LeftForward => Channel::LeftBackward,
            Channel::LeftBackward => Channel::LeftForward,
            Channel::RightForward => Channel::RightBackward,
            Channel::RightBackward => Channel::RightForward,
        }
    }
}

/// Error types for peripheral access
#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },

    #[error("Checksum mismatch in bridge response")]
    ChecksumMismatch,

    #[error("Bridge returned error status: 0x{status:02X}")]
    Status { status: u8 },

    #[error("Timeout waiting for bridge response")]
    Timeout,
}

/// Four independently settable and committable duty-cycle outputs.
///
/// `set_duty` stages a value; it reaches the pin only once `update_duty` latches it.
pub trait PwmBank {
    fn set_duty(&mut self, channel: Channel, duty: u16) -> Result<(), PeripheralError>;
    fn update_duty(&mut self, channel: Channel) -> Result<(), PeripheralError>;
}

/// Single-sample analog input.
pub trait AnalogInput {
    fn read_raw(&mut self) -> Result<u16, PeripheralError>;
}

/// Digital output holding the robot's own power supply on.
pub trait PowerLatch {
    fn hold_power(&mut self) -> Result<(), PeripheralError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_indices_unique() {
        let mut seen = [false; 4];
        for ch in Channel::ALL {
            assert!(!seen[ch.index()]);
            seen[ch.index()] = true;
        }
    }

    #[test]
    fn test_opposite_is_same_side() {
        for ch in Channel::ALL {
            assert_ne!(ch.opposite(), ch);
            assert_eq!(ch.opposite().opposite(), ch);
        }
        assert_eq!(Channel::LeftForward.opposite(), Channel::LeftBackward);
        assert_eq!(Channel::RightBackward.opposite(), Channel::RightForward);
    }
}
