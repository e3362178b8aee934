//! # Arm library.
//!
//! This library allows other crates in the workspace, and the arm executable, to access the
//! items defined inside the arm crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Application loop - works through the command sequence one command at a time
pub mod app;

/// Axis control module - converts output shaft angles into step targets for one joint
pub mod axis_ctrl;

/// Kinematics module - solves for the joint angles placing the end effector at a position
pub mod kinematics;

/// Motion coordination - commands, steps and homes all axes together
pub mod motion_coord;

/// Parameters for the arm executable
pub mod params;

/// Pulse generation - produces the step and direction signals for a stepper driver
pub mod pulse_gen;

/// Simulated physical I/O
pub mod sim;

/// Raspberry Pi GPIO binding
#[cfg(target_arch = "arm")]
pub mod hw;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of axes (joints) on the arm, base first.
pub const NUM_AXES: usize = 2;
