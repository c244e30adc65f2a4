// Serial protocol to the sensor/motor interface board
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Signed duties travel in sign-magnitude form (bit 15 = direction).

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Default serial configuration for the interface board
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Register map of the interface board
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    /// 1 byte, write 1 to run one calibration pass (updates channel min/max)
    CalibrateStep = 10,
    /// 2 bytes per channel, little-endian, calibrated 0..=1000
    Frame = 20,
    /// 2 bytes, signed duty in sign-magnitude form
    WheelDuty = 30,
}

/// Error types for board communication
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from device {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for device {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Device {id} returned error status: 0x{status:02X}")]
    DeviceError { id: u8, status: u8 },

    #[error("Timeout waiting for response from device {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Serial bus to the interface board's devices
pub struct BoardBus {
    port: Box<dyn SerialPort>,
}

impl BoardBus {
    /// Open a new connection to the board
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

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        // Checksum over id, length, instruction, params
        let checksum_data = &packet[2..]; // skip header
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.port.write_all(packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read a response packet, returning its parameter bytes
    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                LinkError::Timeout { id: expected_id }
            } else {
                LinkError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(LinkError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;

        if id != expected_id {
            return Err(LinkError::InvalidResponse {
                id: expected_id,
                reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
            });
        }

        // Read remaining bytes (error + params + checksum = length bytes)
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        // Verify checksum
        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected_checksum = Self::checksum(&checksum_data);
        let received_checksum = remaining[remaining.len() - 1];

        if expected_checksum != received_checksum {
            return Err(LinkError::ChecksumMismatch { id });
        }

        // Check error status
        let error_status = remaining[0];
        if error_status != 0 {
            return Err(LinkError::DeviceError {
                id,
                status: error_status,
            });
        }

        // Return parameters (excluding error byte and checksum)
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Ping a device to check if it's connected
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        let packet = Self::build_packet(id, Instruction::Ping, &[]);
        self.send_packet(&packet)?;

        match self.read_response(id) {
            Ok(_) => Ok(true),
            Err(LinkError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write u8 to device {}: reg={:?}, value={}",
            id, register, value
        );
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Write a signed 16-bit value (for wheel duties)
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let raw = encode_sign_magnitude(value);
        let params = [register as u8, (raw & 0xFF) as u8, (raw >> 8) as u8];
        let packet = Self::build_packet(id, Instruction::Write, &params);
        debug!(
            "Write i16 to device {}: reg={:?}, value={}",
            id, register, value
        );
        self.send_packet(&packet)?;

        let _ = self.read_response(id)?;
        Ok(())
    }

    /// Read `len` bytes starting at a register
    pub fn read_bytes(&mut self, id: u8, register: Register, len: u8) -> Result<Vec<u8>> {
        let params = [register as u8, len];
        let packet = Self::build_packet(id, Instruction::Read, &params);
        self.send_packet(&packet)?;

        let response = self.read_response(id)?;
        if response.len() < len as usize {
            return Err(LinkError::InvalidResponse {
                id,
                reason: format!("Expected {} bytes, got {}", len, response.len()),
            });
        }
        Ok(response)
    }

    /// Sync write signed 16-bit values to the same register on several
    /// devices in one packet (both wheels in one bus transaction)
    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        // Sync write format:
        // [start_addr, data_length, id1, data1_lo, data1_hi, id2, ...]
        let data_length: u8 = 2;
        let mut params = vec![register as u8, data_length];

        for &(id, value) in data {
            let raw = encode_sign_magnitude(value);
            params.push(id);
            params.push((raw & 0xFF) as u8);
            params.push((raw >> 8) as u8);
        }

        // Broadcast ID for sync write
        let packet = Self::build_packet(0xFE, Instruction::SyncWrite, &params);
        debug!("Sync write to {} devices: reg={:?}", data.len(), register);
        self.send_packet(&packet)?;

        // Sync write has no response
        Ok(())
    }
}

/// Encode a signed value to sign-magnitude format
/// Bit 15 = sign (1 = negative), Bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        (0x8000 | (-value as u16)) & 0xFFFF
    }
}

/// Decode sign-magnitude format to signed value
pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}
