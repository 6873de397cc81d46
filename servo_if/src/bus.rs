//! # Servo bus operations
//!
//! [`StsBus`] wraps a byte transport (a real serial port or a mock) and
//! exposes typed operations over the registers in [`crate::registers`]. Every
//! operation is a single instruction/status exchange; multi-register demands
//! (position, speed, acceleration) go out as one contiguous write so the
//! servo latches them together.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use serde::Serialize;
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::protocol::{
    self, build_packet, encode_sign_magnitude, Instruction, ProtocolError, StatusPacket,
    BROADCAST_ID,
};
use crate::registers;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default timeout on a status packet.
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll period while waiting for the moving flag to clear.
const MOVING_POLL_PERIOD: Duration = Duration::from_millis(50);

/// Length of the block read covering present position through present
/// current.
const STATUS_BLOCK_LEN: u8 = registers::PRESENT_CURRENT - registers::PRESENT_POSITION + 2;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A bus over a real serial port.
pub type SerialBus = StsBus<Box<dyn serialport::SerialPort>>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A handle on an STS servo bus.
pub struct StsBus<P> {
    port: P,
    timeout: Duration,
}

/// A snapshot of a servo's sensed state, captured in one block read.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServoStatus {
    /// Present position in ticks (two's-complement reading).
    pub position: i32,

    /// Present speed in ticks/second.
    pub speed: i32,

    /// Present load as a percentage of stall.
    pub load_pct: f64,

    /// Supply voltage in volts.
    pub voltage_v: f64,

    /// Internal temperature in degrees C.
    pub temperature_c: u8,

    /// Whether a move is in progress.
    pub moving: bool,

    /// Raw multi-turn absolute count (wrapping 16 bit).
    pub abs_count: u16,

    /// Present current in milliamps.
    pub current_ma: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Servo operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperatingMode {
    /// Absolute positioning within the angle limits.
    Position,

    /// Continuous rotation at a demanded speed.
    Wheel,

    /// Relative positioning by signed step counts.
    Step,
}

/// Errors which can occur during bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to open serial port {0}: {1}")]
    PortOpenError(String, serialport::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Servo {id} reported fault flags {flags:#04x}")]
    ServoFault { id: u8, flags: u8 },

    #[error("Expected a response from servo {expected} but servo {found} answered")]
    WrongResponder { expected: u8, found: u8 },

    #[error("Status packet carries {found} parameter bytes, expected {expected}")]
    BadParamCount { expected: usize, found: usize },

    #[error("Register {0:#04x} does not hold a known operating mode: {1}")]
    UnknownMode(u8, u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl OperatingMode {
    pub fn to_reg(self) -> u8 {
        match self {
            OperatingMode::Position => 0,
            OperatingMode::Wheel => 1,
            OperatingMode::Step => 3,
        }
    }

    pub fn from_reg(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(OperatingMode::Position),
            1 => Some(OperatingMode::Wheel),
            3 => Some(OperatingMode::Step),
            _ => None,
        }
    }
}

impl StsBus<Box<dyn serialport::SerialPort>> {
    /// Open the bus over the given serial device.
    pub fn open(device: &str, baud: u32) -> Result<Self, BusError> {
        let port = serialport::new(device, baud)
            .timeout(Duration::from_millis(20))
            .open()
            .map_err(|e| BusError::PortOpenError(device.to_string(), e))?;

        Ok(Self::from_port(port))
    }
}

impl<P: Read + Write> StsBus<P> {
    /// Wrap an already-open byte transport.
    pub fn from_port(port: P) -> Self {
        Self {
            port,
            timeout: RESPONSE_TIMEOUT,
        }
    }

    // ---- RAW REGISTER ACCESS ----

    /// Ping a servo, returning its model number.
    pub fn ping(&mut self, id: u8) -> Result<u16, BusError> {
        self.transact(id, Instruction::Ping, &[])?;
        self.read_u16(id, registers::MODEL_NUMBER)
    }

    /// Read a single byte register.
    pub fn read_u8(&mut self, id: u8, addr: u8) -> Result<u8, BusError> {
        let status = self.transact(id, Instruction::Read, &[addr, 1])?;
        expect_params(&status, 1)?;
        Ok(status.params[0])
    }

    /// Read a two byte little-endian register.
    pub fn read_u16(&mut self, id: u8, addr: u8) -> Result<u16, BusError> {
        let status = self.transact(id, Instruction::Read, &[addr, 2])?;
        expect_params(&status, 2)?;
        Ok(LittleEndian::read_u16(&status.params))
    }

    /// Read a block of consecutive registers.
    pub fn read_block(&mut self, id: u8, addr: u8, len: u8) -> Result<Vec<u8>, BusError> {
        let status = self.transact(id, Instruction::Read, &[addr, len])?;
        expect_params(&status, len as usize)?;
        Ok(status.params)
    }

    /// Write a single byte register.
    pub fn write_u8(&mut self, id: u8, addr: u8, value: u8) -> Result<(), BusError> {
        self.transact(id, Instruction::Write, &[addr, value])?;
        Ok(())
    }

    /// Write a two byte little-endian register.
    pub fn write_u16(&mut self, id: u8, addr: u8, value: u16) -> Result<(), BusError> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.transact(id, Instruction::Write, &[addr, buf[0], buf[1]])?;
        Ok(())
    }

    // ---- DEMANDS ----

    /// Demand a position move.
    ///
    /// Writes acceleration, goal position, goal time (zero) and goal speed in
    /// one block so the servo latches the full demand at once. In step mode
    /// the position is a relative step count, in position mode an absolute
    /// one; either way negative values use the sign-magnitude encoding.
    pub fn write_position(
        &mut self,
        id: u8,
        position: i32,
        speed: u16,
        acc: u8,
    ) -> Result<(), BusError> {
        let pos_enc = encode_sign_magnitude(position)?;

        let mut params = [0u8; 8];
        params[0] = registers::ACCELERATION;
        params[1] = acc;
        LittleEndian::write_u16(&mut params[2..4], pos_enc);
        // Goal time stays zero, speed takes priority
        LittleEndian::write_u16(&mut params[6..8], speed);

        trace!("Servo {}: position demand {} @ {} t/s", id, position, speed);

        self.transact(id, Instruction::Write, &params)?;
        Ok(())
    }

    /// Demand a wheel-mode speed. Negative speeds reverse the direction.
    pub fn write_wheel_speed(&mut self, id: u8, speed: i32, acc: u8) -> Result<(), BusError> {
        let speed_enc = encode_sign_magnitude(speed)?;

        self.write_u8(id, registers::ACCELERATION, acc)?;
        self.write_u16(id, registers::GOAL_SPEED, speed_enc)?;

        trace!("Servo {}: wheel speed demand {}", id, speed);

        Ok(())
    }

    // ---- CONFIGURATION ----

    /// Set the servo operating mode.
    pub fn set_mode(&mut self, id: u8, mode: OperatingMode) -> Result<(), BusError> {
        self.write_u8(id, registers::OPERATING_MODE, mode.to_reg())
    }

    /// Read the servo operating mode.
    pub fn get_mode(&mut self, id: u8) -> Result<OperatingMode, BusError> {
        let raw = self.read_u8(id, registers::OPERATING_MODE)?;
        OperatingMode::from_reg(raw).ok_or(BusError::UnknownMode(registers::OPERATING_MODE, raw))
    }

    /// Set the min/max angle limits. Both zero disables limit checking.
    ///
    /// The limit registers live in EEPROM, which must be unlocked first.
    pub fn set_angle_limits(&mut self, id: u8, min: u16, max: u16) -> Result<(), BusError> {
        let mut params = [0u8; 5];
        params[0] = registers::MIN_ANGLE_LIMIT;
        LittleEndian::write_u16(&mut params[1..3], min);
        LittleEndian::write_u16(&mut params[3..5], max);
        self.transact(id, Instruction::Write, &params)?;
        Ok(())
    }

    /// Read back the min/max angle limits.
    pub fn get_angle_limits(&mut self, id: u8) -> Result<(u16, u16), BusError> {
        let min = self.read_u16(id, registers::MIN_ANGLE_LIMIT)?;
        let max = self.read_u16(id, registers::MAX_ANGLE_LIMIT)?;
        Ok((min, max))
    }

    /// Program the hardware position offset (EEPROM).
    pub fn set_position_offset(&mut self, id: u8, offset: u16) -> Result<(), BusError> {
        self.write_u16(id, registers::POSITION_OFFSET, offset)
    }

    /// Enable or disable torque output.
    pub fn set_torque_enable(&mut self, id: u8, enable: bool) -> Result<(), BusError> {
        self.write_u8(id, registers::TORQUE_ENABLE, enable as u8)
    }

    /// Unlock the EEPROM for configuration writes.
    pub fn unlock_eeprom(&mut self, id: u8) -> Result<(), BusError> {
        self.write_u8(id, registers::EEPROM_LOCK, 0)
    }

    /// Lock the EEPROM again.
    pub fn lock_eeprom(&mut self, id: u8) -> Result<(), BusError> {
        self.write_u8(id, registers::EEPROM_LOCK, 1)
    }

    /// Change the servo's bus ID (EEPROM, unlock first).
    pub fn set_id(&mut self, id: u8, new_id: u8) -> Result<(), BusError> {
        self.write_u8(id, registers::ID, new_id)
    }

    // ---- SENSING ----

    /// Read the present position as a signed tick count.
    pub fn read_present_position(&mut self, id: u8) -> Result<i32, BusError> {
        let raw = self.read_u16(id, registers::PRESENT_POSITION)?;
        Ok(protocol::as_signed_16(raw))
    }

    /// Read the raw multi-turn absolute count register.
    pub fn read_abs_count(&mut self, id: u8) -> Result<u16, BusError> {
        self.read_u16(id, registers::ABS_POSITION)
    }

    /// Read the moving flag.
    pub fn read_moving(&mut self, id: u8) -> Result<bool, BusError> {
        Ok(self.read_u8(id, registers::MOVING)? != 0)
    }

    /// Block until the servo reports its move complete.
    pub fn wait_stopped(&mut self, id: u8) -> Result<(), BusError> {
        loop {
            if !self.read_moving(id)? {
                return Ok(());
            }
            thread::sleep(MOVING_POLL_PERIOD);
        }
    }

    /// Read the acceleration register.
    pub fn read_acceleration(&mut self, id: u8) -> Result<u8, BusError> {
        self.read_u8(id, registers::ACCELERATION)
    }

    /// Capture a full status snapshot in one block read.
    pub fn read_status(&mut self, id: u8) -> Result<ServoStatus, BusError> {
        let block = self.read_block(id, registers::PRESENT_POSITION, STATUS_BLOCK_LEN)?;

        let reg = |addr: u8| (addr - registers::PRESENT_POSITION) as usize;

        Ok(ServoStatus {
            position: protocol::as_signed_16(LittleEndian::read_u16(
                &block[reg(registers::PRESENT_POSITION)..],
            )),
            speed: protocol::decode_sign_magnitude(LittleEndian::read_u16(
                &block[reg(registers::PRESENT_SPEED)..],
            )),
            load_pct: protocol::decode_sign_magnitude(LittleEndian::read_u16(
                &block[reg(registers::PRESENT_LOAD)..],
            )) as f64
                / 10.0,
            voltage_v: block[reg(registers::PRESENT_VOLTAGE)] as f64 / 10.0,
            temperature_c: block[reg(registers::PRESENT_TEMPERATURE)],
            moving: block[reg(registers::MOVING)] != 0,
            abs_count: LittleEndian::read_u16(&block[reg(registers::ABS_POSITION)..]),
            current_ma: protocol::decode_sign_magnitude(LittleEndian::read_u16(
                &block[reg(registers::PRESENT_CURRENT)..],
            )) as f64
                * 6.5,
        })
    }

    /// Dump every register up to [`registers::DUMP_END`] as (address, value)
    /// pairs.
    pub fn dump_registers(&mut self, id: u8) -> Result<Vec<(u8, u8)>, BusError> {
        let mut dump = Vec::with_capacity(registers::DUMP_END as usize);
        for addr in 0..registers::DUMP_END {
            dump.push((addr, self.read_u8(id, addr)?));
        }
        Ok(dump)
    }

    // ---- PRIVATE ----

    /// Perform one instruction/status exchange. Broadcasts get no status
    /// packet back and return an empty one.
    fn transact(
        &mut self,
        id: u8,
        instr: Instruction,
        params: &[u8],
    ) -> Result<StatusPacket, BusError> {
        let packet = build_packet(id, instr, params);
        self.port.write_all(&packet).map_err(ProtocolError::Io)?;
        self.port.flush().map_err(ProtocolError::Io)?;

        if id == BROADCAST_ID {
            return Ok(StatusPacket {
                id,
                error: 0,
                params: Vec::new(),
            });
        }

        // Header, responder ID and declared length first
        let mut head = [0u8; 4];
        self.read_exact_timeout(&mut head)?;

        let length = head[3] as usize;
        if length < 2 {
            return Err(ProtocolError::BadLength(head[3]).into());
        }

        let mut raw = Vec::with_capacity(4 + length);
        raw.extend_from_slice(&head);
        raw.resize(4 + length, 0);
        self.read_exact_timeout(&mut raw[4..])?;

        let status = protocol::parse_status(&raw)?;

        if status.id != id {
            return Err(BusError::WrongResponder {
                expected: id,
                found: status.id,
            });
        }
        if status.error != 0 {
            return Err(BusError::ServoFault {
                id: status.id,
                flags: status.error,
            });
        }

        Ok(status)
    }

    /// Fill the buffer from the port, bounded by the response timeout.
    fn read_exact_timeout(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let mut total = 0;
        let start = Instant::now();

        while total < buf.len() {
            if start.elapsed() > self.timeout {
                return Err(ProtocolError::Timeout {
                    wanted: buf.len(),
                    got: total,
                }
                .into());
            }

            match self.port.read(&mut buf[total..]) {
                Ok(0) => thread::sleep(Duration::from_micros(100)),
                Ok(n) => total += n,
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    thread::sleep(Duration::from_micros(100))
                }
                Err(e) => return Err(ProtocolError::Io(e).into()),
            }
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn expect_params(status: &StatusPacket, expected: usize) -> Result<(), BusError> {
    if status.params.len() != expected {
        return Err(BusError::BadParamCount {
            expected,
            found: status.params.len(),
        });
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockServoPort;

    fn bus_with_servo(id: u8) -> StsBus<MockServoPort> {
        StsBus::from_port(MockServoPort::with_servos(&[id]))
    }

    #[test]
    fn test_ping_and_registers() {
        let mut bus = bus_with_servo(1);

        let model = bus.ping(1).unwrap();
        assert_eq!(model, MockServoPort::MODEL_NUMBER);

        bus.write_u8(1, registers::TORQUE_ENABLE, 1).unwrap();
        assert_eq!(bus.read_u8(1, registers::TORQUE_ENABLE).unwrap(), 1);

        bus.write_u16(1, registers::MIN_ANGLE_LIMIT, 0x1234).unwrap();
        assert_eq!(bus.read_u16(1, registers::MIN_ANGLE_LIMIT).unwrap(), 0x1234);
    }

    #[test]
    fn test_missing_servo_times_out() {
        let mut bus = bus_with_servo(1);

        match bus.ping(9) {
            Err(BusError::Protocol(ProtocolError::Timeout { .. })) => (),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_mode_roundtrip() {
        let mut bus = bus_with_servo(2);

        bus.set_mode(2, OperatingMode::Wheel).unwrap();
        assert_eq!(bus.get_mode(2).unwrap(), OperatingMode::Wheel);

        bus.set_mode(2, OperatingMode::Step).unwrap();
        assert_eq!(bus.get_mode(2).unwrap(), OperatingMode::Step);
    }

    #[test]
    fn test_step_move_updates_position_and_moving_flag() {
        let mut bus = bus_with_servo(1);

        bus.set_mode(1, OperatingMode::Step).unwrap();
        bus.write_position(1, -1024, 1200, 50).unwrap();

        // The mock reports a short period of motion after a demand
        assert!(bus.read_moving(1).unwrap());
        bus.wait_stopped(1).unwrap();

        assert_eq!(bus.read_present_position(1).unwrap(), -1024);
        assert_eq!(bus.read_abs_count(1).unwrap(), 0xFC00);
    }

    #[test]
    fn test_status_block() {
        let mut bus = bus_with_servo(1);

        bus.set_mode(1, OperatingMode::Step).unwrap();
        bus.write_position(1, 2048, 1200, 50).unwrap();
        bus.wait_stopped(1).unwrap();

        let status = bus.read_status(1).unwrap();
        assert_eq!(status.position, 2048);
        assert_eq!(status.abs_count, 2048);
        assert!(!status.moving);
    }

    #[test]
    fn test_dump_registers() {
        let mut bus = bus_with_servo(1);
        let dump = bus.dump_registers(1).unwrap();
        assert_eq!(dump.len(), registers::DUMP_END as usize);
        assert_eq!(dump[registers::ID as usize], (registers::ID, 1));
    }
}
