//! # Servo interface crate.
//!
//! Provides the serial bus servo interface shared by all of the arm
//! executables: the register-level wire protocol, the register map, typed bus
//! operations, joint definitions and the arm command set.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Instruction/status packet codec for the STS serial bus protocol.
pub mod protocol;

/// Register map of the STS servo memory table.
pub mod registers;

/// Typed operations over a servo bus.
pub mod bus;

/// Joint definitions and per-joint configuration.
pub mod joints;

/// Arm command definitions.
pub mod cmd;

/// Mock servo port for testing bus users without hardware.
pub mod mock;
