//! # STS servo register map
//!
//! Addresses of the registers the arm software touches. Registers up to the
//! EEPROM lock live in EEPROM and survive power cycles; the rest are SRAM.
//! Multi-byte registers are little-endian.

/// Servo model number (2 bytes, EEPROM, read-only).
pub const MODEL_NUMBER: u8 = 0x03;

/// Servo bus ID (1 byte, EEPROM).
pub const ID: u8 = 0x05;

/// Baud rate selector (1 byte, EEPROM).
pub const BAUD_RATE: u8 = 0x06;

/// Minimum angle limit in ticks (2 bytes, EEPROM). Zero together with the
/// maximum limit disables limit checking.
pub const MIN_ANGLE_LIMIT: u8 = 0x09;

/// Maximum angle limit in ticks (2 bytes, EEPROM).
pub const MAX_ANGLE_LIMIT: u8 = 0x0B;

/// Position offset applied to all readings (2 bytes, EEPROM).
pub const POSITION_OFFSET: u8 = 0x1F;

/// Operating mode (1 byte, EEPROM): 0 position, 1 wheel, 3 step.
pub const OPERATING_MODE: u8 = 0x21;

/// Torque enable (1 byte, SRAM).
pub const TORQUE_ENABLE: u8 = 0x28;

/// Acceleration in units of 100 ticks/s^2 (1 byte, SRAM).
pub const ACCELERATION: u8 = 0x29;

/// Goal position in ticks, sign-magnitude (2 bytes, SRAM).
pub const GOAL_POSITION: u8 = 0x2A;

/// Goal time in milliseconds (2 bytes, SRAM).
pub const GOAL_TIME: u8 = 0x2C;

/// Goal speed in ticks/s, sign-magnitude (2 bytes, SRAM).
pub const GOAL_SPEED: u8 = 0x2E;

/// EEPROM write lock (1 byte, SRAM): 1 locked, 0 unlocked.
pub const EEPROM_LOCK: u8 = 0x37;

/// Present position in ticks, two's-complement (2 bytes, read-only).
pub const PRESENT_POSITION: u8 = 0x38;

/// Present speed in ticks/s, sign-magnitude (2 bytes, read-only).
pub const PRESENT_SPEED: u8 = 0x3A;

/// Present load in 0.1% of stall, sign-magnitude (2 bytes, read-only).
pub const PRESENT_LOAD: u8 = 0x3C;

/// Supply voltage in 0.1 V (1 byte, read-only).
pub const PRESENT_VOLTAGE: u8 = 0x3E;

/// Internal temperature in degrees C (1 byte, read-only).
pub const PRESENT_TEMPERATURE: u8 = 0x3F;

/// Moving flag (1 byte, read-only): non-zero while a move is in progress.
pub const MOVING: u8 = 0x42;

/// Multi-turn absolute step count, wrapping 16 bit (2 bytes, read-only).
///
/// This is the register the multi-turn tracker reconstructs an unbounded
/// absolute position from.
pub const ABS_POSITION: u8 = 0x43;

/// Present current in units of 6.5 mA, sign-magnitude (2 bytes, read-only).
pub const PRESENT_CURRENT: u8 = 0x45;

/// One past the last register covered by a register dump.
pub const DUMP_END: u8 = PRESENT_CURRENT + 1;
