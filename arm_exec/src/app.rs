//! # Application loop
//!
//! Works through the configured command sequence forever, one command at a time. Each command is
//! resolved into joint angles, sent to every axis, and waited on until the arm is still again
//! before the next is taken.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

// Internal
use crate::{
    axis_ctrl::{Axis, AxisCtrlError, AxisStatus},
    kinematics::{IkError, InverseKinematicsSolver, KinematicsAdapter},
    motion_coord::{MotionCoord, MotionError},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The arm application, generic over the axes, their I/O and the IK solver.
pub struct ArmApp<A, S, L, D, K, W, const N: usize> {
    coord: MotionCoord<A, S, L, D, N>,

    kinematics: KinematicsAdapter<K>,

    link_lengths_mm: Vec<f64>,

    sequence: Vec<ArmCmd>,

    /// Index into `sequence` of the next command to execute
    next_cmd: usize,

    /// Number of cycles run so far, successful or not
    cycle: u64,

    /// Pause after each completed command.
    ///
    /// Units: milliseconds
    dwell_ms: u32,

    dwell: W,
}

/// What happened during one cycle of the application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,

    pub cmd: ArmCmd,

    /// Step target handed to each axis. Empty for a homing command.
    pub step_targets: Vec<i64>,

    /// Number of control cycles spent waiting for the arm to stop.
    pub control_cycles: u64,

    /// Whether the IK solver reached the target, `None` if no IK was needed.
    pub ik_reached: Option<bool>,

    /// State of each axis once the command finished.
    pub axes: Vec<AxisStatus>,
}

/// Outcome of [`ArmApp::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Commands executed to completion
    pub completed: u64,

    /// Commands which were rejected and skipped
    pub skipped: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single command for the arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArmCmd {
    /// Place the end effector at a position in the plane of the arm, in millimeters from the base
    /// joint.
    Position { x_mm: f64, y_mm: f64 },

    /// Command each axis directly, in degrees.
    Angles { deg: Vec<f64> },

    /// Home every axis.
    Home,
}

#[derive(Debug, thiserror::Error)]
pub enum ArmAppError {
    #[error("The command sequence is empty")]
    EmptySequence,

    #[error("Could not solve for the target: {0}")]
    Kinematics(#[from] IkError),

    #[error("Motion failed: {0}")]
    Motion(#[from] MotionError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmAppError {
    /// Whether the error only concerns the command being executed, so that the next command can
    /// still be attempted. Hardware faults are not recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ArmAppError::EmptySequence => false,
            ArmAppError::Kinematics(_) => true,
            ArmAppError::Motion(MotionError::AngleCountMismatch { .. }) => true,
            ArmAppError::Motion(MotionError::Busy) => true,
            ArmAppError::Motion(MotionError::Axis {
                source: AxisCtrlError::AngleOutOfRange(_),
                ..
            }) => true,
            ArmAppError::Motion(_) => false,
        }
    }
}

impl<A, S, L, D, K, W, const N: usize> ArmApp<A, S, L, D, K, W, N>
where
    A: Axis,
    S: InputPin,
    L: OutputPin,
    D: DelayMs<u32>,
    K: InverseKinematicsSolver,
    W: DelayMs<u32>,
{
    pub fn new(
        coord: MotionCoord<A, S, L, D, N>,
        kinematics: KinematicsAdapter<K>,
        link_lengths_mm: Vec<f64>,
        sequence: Vec<ArmCmd>,
        dwell_ms: u32,
        dwell: W,
    ) -> Result<Self, ArmAppError> {
        if sequence.is_empty() {
            return Err(ArmAppError::EmptySequence);
        }

        Ok(Self {
            coord,
            kinematics,
            link_lengths_mm,
            sequence,
            next_cmd: 0,
            cycle: 0,
            dwell_ms,
            dwell,
        })
    }

    pub fn coord(&self) -> &MotionCoord<A, S, L, D, N> {
        &self.coord
    }

    /// Bring the arm to a known state by homing every axis.
    pub fn init(&mut self) -> Result<(), ArmAppError> {
        info!("Homing all axes");
        self.coord.home_all()?;
        Ok(())
    }

    /// Execute the next command of the sequence, wrapping around at the end.
    ///
    /// The sequence moves on even if the command fails.
    pub fn run_cycle(&mut self) -> Result<CycleReport, ArmAppError> {
        let cmd = self.sequence[self.next_cmd].clone();
        self.next_cmd = (self.next_cmd + 1) % self.sequence.len();
        self.cycle += 1;

        let mut report = CycleReport {
            cycle: self.cycle,
            cmd: cmd.clone(),
            step_targets: Vec::new(),
            control_cycles: 0,
            ik_reached: None,
            axes: Vec::new(),
        };

        let angles_deg = match cmd {
            ArmCmd::Home => {
                self.coord.home_all()?;
                report.axes = self.coord.status();
                self.dwell.delay_ms(self.dwell_ms);
                return Ok(report);
            }
            ArmCmd::Angles { deg } => {
                info!("Moving joints to {:?} degrees", deg);
                deg
            }
            ArmCmd::Position { x_mm, y_mm } => {
                info!("Moving End Effector to ({}, {}):", x_mm, y_mm);

                let angles = self.kinematics.solve(x_mm, y_mm, &self.link_lengths_mm)?;

                for (i, joint) in angles.joints_mm.iter().enumerate().skip(1) {
                    info!("    Joint {} location: ({:.2}, {:.2})", i, joint.x, joint.y);
                }
                for (i, angle) in angles.angles_deg.iter().enumerate() {
                    info!("    Joint {} angle: {:.2}", i, angle);
                }

                report.ik_reached = Some(angles.reached);
                angles.angles_deg
            }
        };

        report.step_targets = self.coord.command_all(&angles_deg)?.to_vec();
        report.control_cycles = self.coord.run_until_idle()?;
        report.axes = self.coord.status();

        self.dwell.delay_ms(self.dwell_ms);

        Ok(report)
    }

    /// Run cycles until `max_cycles` have been run, or forever if `None`.
    ///
    /// A command which cannot be executed is skipped with a warning. Any other error stops the
    /// loop.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<RunStats, ArmAppError> {
        let mut stats = RunStats::default();

        while max_cycles.map_or(true, |max| stats.completed + stats.skipped < max) {
            match self.run_cycle() {
                Ok(report) => {
                    info!(
                        "Cycle {} complete in {} control cycles",
                        report.cycle, report.control_cycles
                    );
                    for axis in report.axes.iter() {
                        debug!(
                            "    {} axis at {:.2} degrees ({} steps)",
                            axis.name, axis.angle_deg, axis.position_steps
                        );
                    }
                    stats.completed += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Cycle {} skipped: {}", self.cycle, e);
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
