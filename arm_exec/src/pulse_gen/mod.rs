//! # Pulse generation
//!
//! Step/direction pulse generation for a single stepper axis. The axis
//! controller only ever talks to the [`PulseGenerator`] trait, which lets the
//! same control logic run against the software-timed [`AccelStepper`] on
//! hardware and against [`SimPulseGen`] in tests and hardware-less runs.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod accel;
mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

pub use accel::AccelStepper;
pub use sim::SimPulseGen;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capability of producing correctly timed step/direction pulses for one motor.
///
/// All positions are in driver steps (microsteps) and are absolute, relative to the last call to
/// [`PulseGenerator::set_current_position`].
pub trait PulseGenerator {
    /// Set the absolute target position. Motion only happens while [`PulseGenerator::run`] is
    /// polled.
    fn move_to(&mut self, abs_steps: i64);

    /// Poll the generator, taking at most one step if one is due under the acceleration profile.
    ///
    /// Returns `true` while the generator is still running towards the target.
    fn run(&mut self) -> Result<bool, PulseGenError>;

    /// Whether the generator has not yet reached the target and come to rest.
    fn is_running(&self) -> bool;

    /// Set the constant speed used by [`PulseGenerator::run_speed`], in steps/second. The sign
    /// gives the direction of travel. The speed is clamped to the maximum speed.
    fn set_speed(&mut self, steps_per_s: f64);

    /// Poll the generator at constant speed with no acceleration, taking at most one step.
    ///
    /// Returns `true` if a step was taken.
    fn run_speed(&mut self) -> Result<bool, PulseGenError>;

    /// Redefine the current position, also making it the target and stopping the motor.
    fn set_current_position(&mut self, steps: i64);

    fn current_position(&self) -> i64;

    fn target_position(&self) -> i64;

    /// Signed number of steps left to the target.
    fn distance_to_go(&self) -> i64 {
        self.target_position() - self.current_position()
    }

    /// Most recent speed in steps/second.
    fn speed(&self) -> f64;

    fn set_max_speed(&mut self, steps_per_s: f64);

    fn set_acceleration(&mut self, steps_per_s2: f64);
}

/// Something which records the elapsed real time.
pub trait Clock {
    /// Time passed since a clock-specific reference point (e.g. process start).
    fn elapsed(&self) -> Duration;
}

impl<F> Clock for F
where
    F: Fn() -> Duration,
{
    fn elapsed(&self) -> Duration {
        self()
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A monotonically non-decreasing clock backed by the operating system.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    created_at: Instant,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors raised while generating pulses.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum PulseGenError {
    #[error("Could not write to the step pin")]
    StepPin,

    #[error("Could not write to the direction pin")]
    DirPin,
}

/// Direction of rotation of the motor shaft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Counter-clockwise, decreasing step count
    Ccw,

    /// Clockwise, increasing step count
    Cw,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for StdClock {
    fn default() -> Self {
        Self {
            created_at: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}
