// Horizon serial protocol for the Husky motor controller
//
// Frame format:
// [SOH, len, !len, flags, timestamp(4), version, type(2), STX, payload..., crc(2)]
// `len` counts every byte after SOH/len/!len. CRC is CRC-16/CCITT over all
// preceding bytes, little-endian on the wire like every other field.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::channel::{EncoderSnapshot, MotorChannel, SpeedSnapshot};

/// Default serial configuration for the controller
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

const SOH: u8 = 0xAA;
const STX: u8 = 0x55;
const PROTOCOL_VERSION: u8 = 0;
const FLAG_NO_ACK: u8 = 0x02;

// Field offsets
const LENGTH_OFST: usize = 1;
const LENGTH_COMP_OFST: usize = 2;
const FLAGS_OFST: usize = 3;
const TIMESTAMP_OFST: usize = 4;
const VERSION_OFST: usize = 8;
const TYPE_OFST: usize = 9;
const STX_OFST: usize = 11;
const PAYLOAD_OFST: usize = 12;
const CRC_LENGTH: usize = 2;

/// Smallest valid frame: header + empty payload + crc
const MIN_FRAME_LENGTH: usize = PAYLOAD_OFST + CRC_LENGTH;

/// Bit that turns a request type into its data reply type
const DATA_BIT: u16 = 0x4000;

/// Message types used by the drivetrain
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SetDiffWheelSpeeds = 0x0200,
    SetMaxSpeed = 0x0210,
    SetMaxAccel = 0x0211,
    RequestDiffWheelSpeeds = 0x4200,
    RequestEncoders = 0x4800,
    DataDiffWheelSpeeds = 0x8200,
    DataEncoders = 0x8800,
}

impl MessageType {
    /// Reply type for a request
    pub fn data_reply(self) -> u16 {
        self as u16 + DATA_BIT
    }
}

/// Error types for Horizon communication
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel is not connected")]
    NotConnected,

    #[error("Malformed frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{received:04X}")]
    CrcMismatch { expected: u16, received: u16 },

    #[error("Payload of message 0x{msg_type:04X} too short: {len} bytes")]
    PayloadTooShort { msg_type: u16, len: usize },
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF)
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Scale an SI value into the controller's fixed-point i16 representation
fn to_fixed_i16(value: f64, scale: f64) -> i16 {
    let scaled = (value * scale).round();
    scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Decoded frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub flags: u8,
    pub timestamp: u32,
    pub msg_type: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serialize with header, length complement and CRC
    pub fn encode(&self) -> Result<Vec<u8>> {
        let total_len = PAYLOAD_OFST + self.payload.len() + CRC_LENGTH;
        // The length byte counts everything after SOH/len/!len
        let length = u8::try_from(total_len - 3).map_err(|_| ChannelError::InvalidFrame {
            reason: format!("{} byte payload does not fit one frame", self.payload.len()),
        })?;
        let mut packet = Vec::with_capacity(total_len);

        packet.push(SOH);
        packet.push(length);
        packet.push(!length);
        packet.push(self.flags);
        packet.extend_from_slice(&self.timestamp.to_le_bytes());
        packet.push(PROTOCOL_VERSION);
        packet.extend_from_slice(&self.msg_type.to_le_bytes());
        packet.push(STX);
        packet.extend_from_slice(&self.payload);

        let crc = crc16(&packet);
        packet.extend_from_slice(&crc.to_le_bytes());
        Ok(packet)
    }

    /// Parse a complete frame (SOH through CRC)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_FRAME_LENGTH {
            return Err(ChannelError::InvalidFrame {
                reason: format!("{} bytes is shorter than a header", bytes.len()),
            });
        }
        if bytes[0] != SOH {
            return Err(ChannelError::InvalidFrame {
                reason: format!("bad start byte 0x{:02X}", bytes[0]),
            });
        }
        let length = bytes[LENGTH_OFST];
        if length != !bytes[LENGTH_COMP_OFST] {
            return Err(ChannelError::InvalidFrame {
                reason: "length complement mismatch".to_string(),
            });
        }
        if length as usize + 3 != bytes.len() {
            return Err(ChannelError::InvalidFrame {
                reason: format!("length field {} for {} byte frame", length, bytes.len()),
            });
        }
        if bytes[STX_OFST] != STX {
            return Err(ChannelError::InvalidFrame {
                reason: format!("bad STX byte 0x{:02X}", bytes[STX_OFST]),
            });
        }

        let crc_at = bytes.len() - CRC_LENGTH;
        let expected = crc16(&bytes[..crc_at]);
        let received = u16::from_le_bytes([bytes[crc_at], bytes[crc_at + 1]]);
        if expected != received {
            return Err(ChannelError::CrcMismatch { expected, received });
        }

        Ok(Self {
            flags: bytes[FLAGS_OFST],
            timestamp: u32::from_le_bytes([
                bytes[TIMESTAMP_OFST],
                bytes[TIMESTAMP_OFST + 1],
                bytes[TIMESTAMP_OFST + 2],
                bytes[TIMESTAMP_OFST + 3],
            ]),
            msg_type: u16::from_le_bytes([bytes[TYPE_OFST], bytes[TYPE_OFST + 1]]),
            payload: bytes[PAYLOAD_OFST..crc_at].to_vec(),
        })
    }

    /// Encoder data: [count, travel i32 mm * count, speed i16 mm/s * count]
    pub fn encoder_snapshot(&self) -> Result<EncoderSnapshot> {
        let too_short = || ChannelError::PayloadTooShort {
            msg_type: self.msg_type,
            len: self.payload.len(),
        };
        let count = *self.payload.first().ok_or_else(too_short)? as usize;
        if count < 2 || self.payload.len() < 1 + count * 6 {
            return Err(too_short());
        }

        let travel = |i: usize| {
            let at = 1 + i * 4;
            let raw = i32::from_le_bytes([
                self.payload[at],
                self.payload[at + 1],
                self.payload[at + 2],
                self.payload[at + 3],
            ]);
            raw as f64 / 1000.0
        };
        Ok(EncoderSnapshot::new(travel(0), travel(1)))
    }

    /// Differential speed data: [left, right, left accel, right accel] as i16 / 100
    pub fn speed_snapshot(&self) -> Result<SpeedSnapshot> {
        if self.payload.len() < 8 {
            return Err(ChannelError::PayloadTooShort {
                msg_type: self.msg_type,
                len: self.payload.len(),
            });
        }
        let field = |at: usize| {
            i16::from_le_bytes([self.payload[at], self.payload[at + 1]]) as f64 / 100.0
        };
        Ok(SpeedSnapshot::new(field(0), field(2)))
    }
}

/// Horizon motor controller bus - handles serial communication with the MCU
pub struct HorizonBus {
    port: Option<Box<dyn SerialPort>>,
    baudrate: u32,
    opened_at: Instant,
}

impl Default for HorizonBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HorizonBus {
    /// Create an unconnected bus; `connect` opens the port
    pub fn new() -> Self {
        Self::with_baudrate(DEFAULT_BAUDRATE)
    }

    pub fn with_baudrate(baudrate: u32) -> Self {
        Self {
            port: None,
            baudrate,
            opened_at: Instant::now(),
        }
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(ChannelError::NotConnected)
    }

    fn timestamp(&self) -> u32 {
        self.opened_at.elapsed().as_millis() as u32
    }

    fn send(&mut self, msg_type: MessageType, flags: u8, payload: Vec<u8>) -> Result<()> {
        let frame = Frame {
            flags,
            timestamp: self.timestamp(),
            msg_type: msg_type as u16,
            payload,
        };
        let packet = frame.encode()?;
        debug!("Send {:?}: {} bytes", msg_type, packet.len());

        let port = self.port()?;
        port.write_all(&packet)?;
        port.flush()?;
        Ok(())
    }

    /// Send a setpoint; setpoints are not acknowledged
    fn send_setpoint(&mut self, msg_type: MessageType, values: &[i16]) -> Result<()> {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.send(msg_type, FLAG_NO_ACK, payload)
    }

    /// Fill `buf` before `deadline`. Returns false on timeout.
    fn read_until(&mut self, buf: &mut [u8], deadline: Instant) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            let port = self.port()?;
            port.set_timeout(remaining)?;
            match port.read(&mut buf[filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(false),
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(true)
    }

    /// Read the next well-formed frame, skipping noise and corrupt frames
    fn read_frame(&mut self, deadline: Instant) -> Result<Option<Frame>> {
        loop {
            let mut soh = [0u8; 1];
            if !self.read_until(&mut soh, deadline)? {
                return Ok(None);
            }
            if soh[0] != SOH {
                continue;
            }

            let mut length = [0u8; 2];
            if !self.read_until(&mut length, deadline)? {
                return Ok(None);
            }
            if length[0] != !length[1] || (length[0] as usize) + 3 < MIN_FRAME_LENGTH {
                debug!("Discarding frame with bad length byte 0x{:02X}", length[0]);
                continue;
            }

            let mut bytes = vec![0u8; length[0] as usize + 3];
            bytes[0] = SOH;
            bytes[LENGTH_OFST] = length[0];
            bytes[LENGTH_COMP_OFST] = length[1];
            if !self.read_until(&mut bytes[3..], deadline)? {
                return Ok(None);
            }

            match Frame::decode(&bytes) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => debug!("Discarding frame: {}", e),
            }
        }
    }

    /// Request a single data message and wait for the matching reply
    fn request(&mut self, msg_type: MessageType, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        // Subscription period 0 asks for a single immediate reply
        self.send(msg_type, 0, 0u16.to_le_bytes().to_vec())?;

        let reply_type = msg_type.data_reply();
        while let Some(frame) = self.read_frame(deadline)? {
            if frame.msg_type == reply_type {
                return Ok(Some(frame));
            }
            debug!("Ignoring unexpected message 0x{:04X}", frame.msg_type);
        }
        Ok(None)
    }
}

impl MotorChannel for HorizonBus {
    fn connect(&mut self, port_name: &str) -> Result<()> {
        info!("Opening Horizon bus on {} at {} baud", port_name, self.baudrate);
        let port = serialport::new(port_name, self.baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        self.port = Some(port);
        self.opened_at = Instant::now();
        Ok(())
    }

    fn configure_limits(&mut self, max_speed: f64, max_accel: f64) -> Result<()> {
        info!(
            "Configuring limits: max_speed={} m/s, max_accel={} m/s^2",
            max_speed, max_accel
        );
        // Same bound forwards and in reverse
        let speed = to_fixed_i16(max_speed, 100.0);
        let accel = to_fixed_i16(max_accel, 100.0);
        self.send_setpoint(MessageType::SetMaxSpeed, &[speed, speed])?;
        self.send_setpoint(MessageType::SetMaxAccel, &[accel, accel])
    }

    fn request_encoders(&mut self, timeout: Duration) -> Result<Option<EncoderSnapshot>> {
        match self.request(MessageType::RequestEncoders, timeout)? {
            Some(frame) => frame.encoder_snapshot().map(Some),
            None => Ok(None),
        }
    }

    fn request_speeds(&mut self, timeout: Duration) -> Result<Option<SpeedSnapshot>> {
        match self.request(MessageType::RequestDiffWheelSpeeds, timeout)? {
            Some(frame) => frame.speed_snapshot().map(Some),
            None => Ok(None),
        }
    }

    fn control_speed(&mut self, left: f64, right: f64, accel: f64, decel: f64) -> Result<()> {
        debug!(
            "Control speed: left={:.3}, right={:.3}, accel={:.3}, decel={:.3}",
            left, right, accel, decel
        );
        let values = [
            to_fixed_i16(left, 100.0),
            to_fixed_i16(right, 100.0),
            to_fixed_i16(accel, 100.0),
            to_fixed_i16(decel, 100.0),
        ];
        self.send_setpoint(MessageType::SetDiffWheelSpeeds, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16() {
        // Standard check value for CRC-16/CCITT-FALSE
        assert_eq!(crc16(b"123456789"), 0x29B1);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_encode_header() {
        let frame = Frame {
            flags: FLAG_NO_ACK,
            timestamp: 0x0102_0304,
            msg_type: MessageType::SetMaxSpeed as u16,
            payload: vec![0x64, 0x00, 0x64, 0x00],
        };
        let packet = frame.encode().unwrap();
        // Header (12) + payload (4) + CRC (2)
        assert_eq!(packet.len(), 18);
        assert_eq!(packet[0], SOH);
        assert_eq!(packet[LENGTH_OFST], 15);
        assert_eq!(packet[LENGTH_COMP_OFST], !15u8);
        assert_eq!(packet[FLAGS_OFST], FLAG_NO_ACK);
        assert_eq!(&packet[TIMESTAMP_OFST..VERSION_OFST], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&packet[TYPE_OFST..STX_OFST], &[0x10, 0x02]);
        assert_eq!(packet[STX_OFST], STX);
        assert_eq!(Frame::decode(&packet).unwrap(), frame);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut frame = Frame {
            flags: 0,
            timestamp: 0,
            msg_type: MessageType::SetDiffWheelSpeeds as u16,
            payload: vec![0; 244],
        };
        let packet = frame.encode().unwrap();
        assert_eq!(packet[LENGTH_OFST], 255);
        assert_eq!(Frame::decode(&packet).unwrap(), frame);

        frame.payload.push(0);
        assert!(matches!(
            frame.encode(),
            Err(ChannelError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let frame = Frame {
            flags: 0,
            timestamp: 7,
            msg_type: MessageType::DataDiffWheelSpeeds as u16,
            payload: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        let mut packet = frame.encode().unwrap();
        packet[PAYLOAD_OFST] ^= 0xFF;
        assert!(matches!(
            Frame::decode(&packet),
            Err(ChannelError::CrcMismatch { .. })
        ));

        let mut packet = frame.encode().unwrap();
        packet[LENGTH_COMP_OFST] = 0;
        assert!(matches!(
            Frame::decode(&packet),
            Err(ChannelError::InvalidFrame { .. })
        ));

        assert!(Frame::decode(&packet[..5]).is_err());
    }

    #[test]
    fn test_encoder_payload() {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&1500i32.to_le_bytes());
        payload.extend_from_slice(&(-250i32).to_le_bytes());
        payload.extend_from_slice(&100i16.to_le_bytes());
        payload.extend_from_slice(&(-100i16).to_le_bytes());
        let frame = Frame {
            flags: 0,
            timestamp: 0,
            msg_type: MessageType::DataEncoders as u16,
            payload,
        };
        let snapshot = frame.encoder_snapshot().unwrap();
        assert!((snapshot.left_travel - 1.5).abs() < 1e-12);
        assert!((snapshot.right_travel + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_encoder_payload_too_short() {
        let frame = Frame {
            flags: 0,
            timestamp: 0,
            msg_type: MessageType::DataEncoders as u16,
            payload: vec![2, 0, 0, 0],
        };
        assert!(matches!(
            frame.encoder_snapshot(),
            Err(ChannelError::PayloadTooShort { len: 4, .. })
        ));
    }

    #[test]
    fn test_speed_payload() {
        let payload: Vec<u8> = [30i16, -15, 50, 50]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let frame = Frame {
            flags: 0,
            timestamp: 0,
            msg_type: MessageType::DataDiffWheelSpeeds as u16,
            payload,
        };
        let snapshot = frame.speed_snapshot().unwrap();
        assert!((snapshot.left_speed - 0.3).abs() < 1e-12);
        assert!((snapshot.right_speed + 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_data_reply_types() {
        assert_eq!(
            MessageType::RequestEncoders.data_reply(),
            MessageType::DataEncoders as u16
        );
        assert_eq!(
            MessageType::RequestDiffWheelSpeeds.data_reply(),
            MessageType::DataDiffWheelSpeeds as u16
        );
    }

    #[test]
    fn test_fixed_point_clamps() {
        assert_eq!(to_fixed_i16(0.3, 100.0), 30);
        assert_eq!(to_fixed_i16(-0.157, 100.0), -16);
        assert_eq!(to_fixed_i16(1000.0, 100.0), i16::MAX);
        assert_eq!(to_fixed_i16(-1000.0, 100.0), i16::MIN);
    }

    #[test]
    fn test_unconnected_bus() {
        let mut bus = HorizonBus::new();
        assert!(matches!(
            bus.control_speed(0.0, 0.0, 1.0, 1.0),
            Err(ChannelError::NotConnected)
        ));
    }
}
