//! # STS serial bus protocol codec
//!
//! Instruction packets have the form `[0xFF, 0xFF, id, len, instr, params...,
//! checksum]`, status packets `[0xFF, 0xFF, id, len, error, params...,
//! checksum]`. `len` counts everything after itself, checksum included.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Two byte marker opening every packet on the bus.
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// ID addressing every servo on the bus at once. Broadcasts get no status
/// packet back.
pub const BROADCAST_ID: u8 = 0xFE;

/// Highest assignable servo ID.
pub const MAX_ID: u8 = 0xFD;

/// Largest magnitude representable in the sign-magnitude registers.
pub const MAX_SIGN_MAGNITUDE: i32 = 0x7FFF;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Instruction codes understood by STS servos.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    SyncWrite = 0x83,
}

/// Errors raised by the packet codec.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error on the bus: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for a status packet ({got} of {wanted} bytes)")]
    Timeout { wanted: usize, got: usize },

    #[error("Bad status packet header: {0:#04x} {1:#04x}")]
    BadHeader(u8, u8),

    #[error("Status packet declares an impossible length: {0}")]
    BadLength(u8),

    #[error("Checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    ChecksumMismatch { expected: u8, found: u8 },

    #[error("Value {0} does not fit the 15 bit sign-magnitude encoding")]
    ValueOutOfRange(i32),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A decoded status packet.
#[derive(Debug, Clone)]
pub struct StatusPacket {
    /// ID of the responding servo.
    pub id: u8,

    /// Fault flags reported by the servo. Zero means no fault.
    pub error: u8,

    /// Parameter bytes (register contents for read instructions).
    pub params: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Calculate the checksum over id, length, instruction/error and parameters.
///
/// The checksum is the bitwise NOT of the truncated byte sum.
pub fn checksum(id: u8, length: u8, instr: u8, params: &[u8]) -> u8 {
    let mut sum = id.wrapping_add(length).wrapping_add(instr);
    for p in params {
        sum = sum.wrapping_add(*p);
    }
    !sum
}

/// Build an instruction packet ready to be written to the bus.
pub fn build_packet(id: u8, instr: Instruction, params: &[u8]) -> Vec<u8> {
    // Length counts instruction, params and checksum
    let length = (params.len() + 2) as u8;

    let mut packet = Vec::with_capacity(params.len() + 6);
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instr as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(id, length, instr as u8, params));

    packet
}

/// Decode a status packet from its raw bytes (header included), verifying the
/// declared length and the checksum.
pub fn parse_status(raw: &[u8]) -> Result<StatusPacket, ProtocolError> {
    if raw.len() < 6 {
        return Err(ProtocolError::Timeout {
            wanted: 6,
            got: raw.len(),
        });
    }
    if raw[0] != HEADER[0] || raw[1] != HEADER[1] {
        return Err(ProtocolError::BadHeader(raw[0], raw[1]));
    }

    let id = raw[2];
    let length = raw[3];

    // Length counts error byte, params and checksum
    if (length as usize) < 2 || raw.len() != length as usize + 4 {
        return Err(ProtocolError::BadLength(length));
    }

    let error = raw[4];
    let params = raw[5..raw.len() - 1].to_vec();

    let expected = checksum(id, length, error, &params);
    let found = raw[raw.len() - 1];
    if expected != found {
        return Err(ProtocolError::ChecksumMismatch { expected, found });
    }

    Ok(StatusPacket { id, error, params })
}

/// Encode a signed value into the 15 bit sign-magnitude form used by the goal
/// position and goal speed registers (negative values set bit 15).
pub fn encode_sign_magnitude(value: i32) -> Result<u16, ProtocolError> {
    if value.abs() > MAX_SIGN_MAGNITUDE {
        return Err(ProtocolError::ValueOutOfRange(value));
    }

    if value < 0 {
        Ok((-value) as u16 | 0x8000)
    } else {
        Ok(value as u16)
    }
}

/// Decode a 15 bit sign-magnitude register value.
pub fn decode_sign_magnitude(raw: u16) -> i32 {
    if raw & 0x8000 != 0 {
        -((raw & 0x7FFF) as i32)
    } else {
        raw as i32
    }
}

/// Interpret a 16 bit register value as two's-complement.
///
/// The present position register counts past zero, so raw values above 0x7FFF
/// are negative readings.
pub fn as_signed_16(raw: u16) -> i32 {
    raw as i16 as i32
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_build_ping_packet() {
        // Ping of servo 1: sum = 1 + 2 + 1 = 4, checksum = !4 = 0xFB
        let packet = build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet, vec![0xFF, 0xFF, 0x01, 0x02, 0x01, 0xFB]);
    }

    #[test]
    fn test_build_read_packet() {
        // Read 2 bytes from register 0x38 of servo 1
        let packet = build_packet(1, Instruction::Read, &[0x38, 0x02]);
        let cs = checksum(1, 4, Instruction::Read as u8, &[0x38, 0x02]);
        assert_eq!(packet, vec![0xFF, 0xFF, 0x01, 0x04, 0x02, 0x38, 0x02, cs]);
    }

    #[test]
    fn test_parse_status_roundtrip() {
        // Status from servo 3 with two parameter bytes and no fault
        let params = [0x10, 0x27];
        let length = (params.len() + 2) as u8;
        let mut raw = vec![0xFF, 0xFF, 0x03, length, 0x00];
        raw.extend_from_slice(&params);
        raw.push(checksum(0x03, length, 0x00, &params));

        let status = parse_status(&raw).unwrap();
        assert_eq!(status.id, 3);
        assert_eq!(status.error, 0);
        assert_eq!(status.params, params);
    }

    #[test]
    fn test_parse_status_bad_checksum() {
        let mut raw = vec![0xFF, 0xFF, 0x01, 0x02, 0x00];
        raw.push(0x42);

        match parse_status(&raw) {
            Err(ProtocolError::ChecksumMismatch { .. }) => (),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(0).unwrap(), 0);
        assert_eq!(encode_sign_magnitude(1024).unwrap(), 1024);
        assert_eq!(encode_sign_magnitude(-1024).unwrap(), 0x8400);
        assert_eq!(encode_sign_magnitude(0x7FFF).unwrap(), 0x7FFF);
        assert!(encode_sign_magnitude(0x8000).is_err());
        assert!(encode_sign_magnitude(-0x8000).is_err());

        assert_eq!(decode_sign_magnitude(0x8400), -1024);
        assert_eq!(decode_sign_magnitude(1024), 1024);
    }

    #[test]
    fn test_as_signed_16() {
        assert_eq!(as_signed_16(0), 0);
        assert_eq!(as_signed_16(0x7FFF), 32767);
        assert_eq!(as_signed_16(0xFFFF), -1);
        assert_eq!(as_signed_16(0x8000), -32768);
    }
}
