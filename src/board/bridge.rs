// Serial I/O bridge protocol
//
// The bridge board owns the PWM timer, the battery ADC and the power-hold pin.
// Packet format: [0xFF, 0xFF, Length, Instruction, Params..., Checksum]
// Reply format:  [0xFF, 0xFF, Length, Status, Params..., Checksum]
// Length counts the bytes after itself (instruction/status + params + checksum).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::{AnalogInput, Channel, PeripheralError, PowerLatch, PwmBank};
use crate::config::CHANNEL_MAP;

/// Default serial configuration for the bridge
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 20;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Digital output driving the power-hold transistor
const POWER_HOLD_PIN: u8 = 17;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    ReadAdc = 0x02,
    SetDuty = 0x03,
    UpdateDuty = 0x04,
    SetLevel = 0x05,
}

pub type Result<T> = std::result::Result<T, PeripheralError>;

/// Owns the port and speaks the bridge protocol
pub struct BridgeBus<P> {
    port: P,
}

impl BridgeBus<Box<dyn SerialPort>> {
    /// Open a new connection to the bridge
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }
}

impl<P: Read + Write> BridgeBus<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8;
        let mut packet = Vec::with_capacity(5 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));

        packet
    }

    /// Send a request and return the reply parameters
    fn transact(&mut self, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_response()
    }

    fn read_exact_or_timeout(&mut self, buf: &mut [u8]) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                PeripheralError::Timeout
            } else {
                PeripheralError::Io(e)
            }
        })
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 3];
        self.read_exact_or_timeout(&mut header)?;

        if header[..2] != HEADER {
            return Err(PeripheralError::InvalidResponse {
                reason: format!("Invalid header: {:02X?}", &header[..2]),
            });
        }

        let length = header[2] as usize;
        if length < 2 {
            return Err(PeripheralError::InvalidResponse {
                reason: format!("Length {} too short", length),
            });
        }

        // status + params + checksum
        let mut remaining = vec![0u8; length];
        self.read_exact_or_timeout(&mut remaining)?;

        let mut checksum_data = vec![header[2]];
        checksum_data.extend_from_slice(&remaining[..length - 1]);
        if Self::checksum(&checksum_data) != remaining[length - 1] {
            return Err(PeripheralError::ChecksumMismatch);
        }

        let status = remaining[0];
        if status != 0 {
            return Err(PeripheralError::Status { status });
        }

        Ok(remaining[1..length - 1].to_vec())
    }

    /// Check the bridge answers at all
    pub fn ping(&mut self) -> Result<bool> {
        match self.transact(Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(PeripheralError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Raw 12-bit battery sample
    pub fn read_adc(&mut self) -> Result<u16> {
        let response = self.transact(Instruction::ReadAdc, &[])?;
        if response.len() < 2 {
            return Err(PeripheralError::InvalidResponse {
                reason: format!("Expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    /// Stage a duty value on a bridge channel (not yet visible on the pin)
    pub fn set_duty(&mut self, channel: u8, duty: u16) -> Result<()> {
        let [lo, hi] = duty.to_le_bytes();
        debug!("Set duty: ch={}, duty={}", channel, duty);
        self.transact(Instruction::SetDuty, &[channel, lo, hi])?;
        Ok(())
    }

    /// Latch the staged duty of a bridge channel
    pub fn update_duty(&mut self, channel: u8) -> Result<()> {
        self.transact(Instruction::UpdateDuty, &[channel])?;
        Ok(())
    }

    pub fn set_level(&mut self, pin: u8, high: bool) -> Result<()> {
        debug!("Set level: pin={}, high={}", pin, high);
        self.transact(Instruction::SetLevel, &[pin, high as u8])?;
        Ok(())
    }
}

fn bridge_channel(channel: Channel) -> u8 {
    CHANNEL_MAP
        .iter()
        .find(|(ch, _)| *ch == channel)
        .map(|&(_, num)| num)
        .unwrap_or(channel.index() as u8)
}

/// Shared handle to one bridge; the driver, the sensor and the power latch each hold a clone.
#[derive(Clone)]
pub struct SerialBridge {
    bus: Arc<Mutex<BridgeBus<Box<dyn SerialPort>>>>,
}

impl SerialBridge {
    pub fn open(port_name: &str) -> Result<Self> {
        let bus = BridgeBus::open(port_name)?;
        Ok(Self {
            bus: Arc::new(Mutex::new(bus)),
        })
    }

    fn bus(&self) -> MutexGuard<'_, BridgeBus<Box<dyn SerialPort>>> {
        self.bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ping(&self) -> Result<bool> {
        self.bus().ping()
    }
}

impl PwmBank for SerialBridge {
    fn set_duty(&mut self, channel: Channel, duty: u16) -> Result<()> {
        self.bus().set_duty(bridge_channel(channel), duty)
    }

    fn update_duty(&mut self, channel: Channel) -> Result<()> {
        self.bus().update_duty(bridge_channel(channel))
    }
}

impl AnalogInput for SerialBridge {
    fn read_raw(&mut self) -> Result<u16> {
        self.bus().read_adc()
    }
}

impl PowerLatch for SerialBridge {
    fn hold_power(&mut self) -> Result<()> {
        self.bus().set_level(POWER_HOLD_PIN, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Replays canned replies and records what was written
    struct LoopbackPort {
        rx: Cursor<Vec<u8>>,
        tx: Vec<u8>,
    }

    impl LoopbackPort {
        fn replying(frames: &[Vec<u8>]) -> Self {
            Self {
                rx: Cursor::new(frames.concat()),
                tx: Vec::new(),
            }
        }
    }

    impl Read for LoopbackPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.rx.read(buf)?;
            if n == 0 && !buf.is_empty() {
                return Err(std::io::ErrorKind::TimedOut.into());
            }
            Ok(n)
        }
    }

    impl Write for LoopbackPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.tx.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn reply(status: u8, params: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFF, 0xFF, (params.len() + 2) as u8, status];
        frame.extend_from_slice(params);
        let chk = BridgeBus::<LoopbackPort>::checksum(&frame[2..]);
        frame.push(chk);
        frame
    }

    #[test]
    fn test_checksum() {
        // ~(4 + 0x03 + 2 + 0xFF + 0x03) = ~0x10B -> 0xF4
        let data = [4u8, 0x03, 2, 0xFF, 0x03];
        assert_eq!(BridgeBus::<LoopbackPort>::checksum(&data), 0xF4);
    }

    #[test]
    fn test_build_packet() {
        let packet = BridgeBus::<LoopbackPort>::build_packet(Instruction::Ping, &[]);
        // Header (2) + Length (1) + Instruction (1) + Checksum (1)
        assert_eq!(packet.len(), 5);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 2);
        assert_eq!(packet[3], 0x01);
    }

    #[test]
    fn test_set_duty_encodes_little_endian() {
        let mut bus = BridgeBus::new(LoopbackPort::replying(&[reply(0, &[])]));
        bus.set_duty(2, 0x03FF).unwrap();
        assert_eq!(&bus.port.tx[..6], &[0xFF, 0xFF, 5, 0x03, 2, 0xFF]);
        assert_eq!(bus.port.tx[6], 0x03);
    }

    #[test]
    fn test_read_adc() {
        let mut bus = BridgeBus::new(LoopbackPort::replying(&[reply(0, &2048u16.to_le_bytes())]));
        assert_eq!(bus.read_adc().unwrap(), 2048);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut frame = reply(0, &[1, 2]);
        let last = frame.len() - 1;
        frame[last] ^= 0x55;
        let mut bus = BridgeBus::new(LoopbackPort::replying(&[frame]));
        assert!(matches!(bus.read_adc(), Err(PeripheralError::ChecksumMismatch)));
    }

    #[test]
    fn test_error_status_surfaces() {
        let mut bus = BridgeBus::new(LoopbackPort::replying(&[reply(0x20, &[])]));
        assert!(matches!(
            bus.update_duty(0),
            Err(PeripheralError::Status { status: 0x20 })
        ));
    }

    #[test]
    fn test_ping_timeout_is_not_an_error() {
        let mut bus = BridgeBus::new(LoopbackPort::replying(&[]));
        assert!(!bus.ping().unwrap());
    }

    #[test]
    fn test_channel_map_covers_all_channels() {
        let mut nums: Vec<u8> = Channel::ALL.iter().map(|&ch| bridge_channel(ch)).collect();
        nums.sort();
        assert_eq!(nums, vec![0, 1, 2, 3]);
    }
}
