//! # Arm kinematics crate
//!
//! Closed-form kinematics for the serial-link arm layouts used by the
//! executables: a 3-link planar chain (two links plus a tool offset) and a
//! 5 DOF spatial chain (base rotation, shoulder, elbow, wrist pitch, wrist
//! roll). All solvers are analytic; targets outside the workspace return
//! `None` rather than a clamped or NaN solution.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Kinematics of the 3-link planar chain.
pub mod planar;

/// Kinematics of the 5 DOF spatial chain.
pub mod spatial;
