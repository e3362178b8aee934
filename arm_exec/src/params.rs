//! # Arm executable parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{app::ArmCmd, axis_ctrl::HomingCfg, kinematics::SolverKind, NUM_AXES};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the whole arm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmExecParams {
    // ---- GEOMETRY ----
    /// Length of each link of the arm, base first.
    ///
    /// Units: millimeters
    pub link_lengths_mm: Vec<f64>,

    // ---- KINEMATICS ----
    /// Which inverse kinematics solver to use.
    pub ik_solver: SolverKind,

    /// Largest end effector position error accepted as a solution.
    ///
    /// Units: millimeters
    pub ik_tolerance_mm: f64,

    /// Bound on the number of iterations of iterative solvers.
    pub ik_max_iterations: usize,

    // ---- AXES ----
    /// Configuration of every axis, in the order the coordinator drives them.
    pub axes: [AxisParams; NUM_AXES],

    /// Order in which the axes are homed, as indices into `axes`.
    ///
    /// Upper joints must be homed before the joints below them, otherwise an upper joint's
    /// homing sweep can hit a lower joint which is still in an arbitrary position.
    pub homing_order: [usize; NUM_AXES],

    /// GPIO pin of the indicator LED.
    pub indicator_pin: u8,

    /// Length of the indicator flash confirming that an axis was zeroed.
    ///
    /// Units: milliseconds
    pub indicator_pulse_ms: u32,

    // ---- APPLICATION ----
    /// Commands executed in turn by the application loop, wrapping around at the end.
    pub sequence: Vec<ArmCmd>,

    /// Pause after each completed command.
    ///
    /// Units: milliseconds
    pub dwell_ms: u32,
}

/// Parameters of a single stepper axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisParams {
    /// Name used in diagnostics.
    pub name: String,

    /// GPIO pin wired to the driver's STEP input.
    pub step_pin: u8,

    /// GPIO pin wired to the driver's DIR input.
    pub dir_pin: u8,

    /// GPIO pin of the axis's active-low hall effect homing sensor.
    pub hall_pin: u8,

    /// Units: steps/second^2
    pub acceleration_steps_s2: f64,

    /// Units: steps/second
    pub max_speed_steps_s: f64,

    /// Driver microstepping resolution (driver pulses per full step).
    pub microstep_res: u32,

    /// Reduction between motor shaft and output shaft. Negative if the gearing reverses the
    /// direction of rotation.
    pub gear_reduction: f64,

    /// Constant speed of the homing seek, signed towards the sensor.
    ///
    /// Units: steps/second
    pub seek_speed_steps_s: f64,

    /// Maximum seek travel before homing is declared failed. Unbounded if not set.
    pub max_seek_steps: Option<u64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Inconsistencies found in a parameter set.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("Homing order {0:?} is not a permutation of the axis indices")]
    InvalidHomingOrder([usize; NUM_AXES]),

    #[error("Expected {expected} link lengths, found {found}")]
    LinkCount { expected: usize, found: usize },

    #[error("Link lengths must all be positive, found {0:?}")]
    NonPositiveLink(Vec<f64>),

    #[error("The IK tolerance must be positive, found {0}")]
    NonPositiveTolerance(f64),

    #[error("Axis {axis} has an invalid {field}")]
    InvalidAxis { axis: String, field: &'static str },

    #[error("The command sequence is empty")]
    EmptySequence,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmExecParams {
    /// Check the parameters describe an arm which can be driven.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !is_permutation(&self.homing_order) {
            return Err(ParamsError::InvalidHomingOrder(self.homing_order));
        }

        if self.link_lengths_mm.len() != NUM_AXES {
            return Err(ParamsError::LinkCount {
                expected: NUM_AXES,
                found: self.link_lengths_mm.len(),
            });
        }

        if self.link_lengths_mm.iter().any(|l| !(*l > 0.0)) {
            return Err(ParamsError::NonPositiveLink(self.link_lengths_mm.clone()));
        }

        if !(self.ik_tolerance_mm > 0.0) {
            return Err(ParamsError::NonPositiveTolerance(self.ik_tolerance_mm));
        }

        for axis in self.axes.iter() {
            axis.validate()?;
        }

        if self.sequence.is_empty() {
            return Err(ParamsError::EmptySequence);
        }

        Ok(())
    }

    /// Homing configuration of each axis.
    pub fn homing_cfgs(&self) -> [HomingCfg; NUM_AXES] {
        let mut cfgs = [HomingCfg {
            seek_speed_steps_s: 0.0,
            max_seek_steps: None,
            indicator_pulse_ms: self.indicator_pulse_ms,
        }; NUM_AXES];

        for (cfg, axis) in cfgs.iter_mut().zip(self.axes.iter()) {
            cfg.seek_speed_steps_s = axis.seek_speed_steps_s;
            cfg.max_seek_steps = axis.max_seek_steps;
        }

        cfgs
    }
}

impl Default for ArmExecParams {
    /// The deployed two link arm.
    fn default() -> Self {
        Self {
            link_lengths_mm: vec![150.0, 150.0],
            ik_solver: SolverKind::Fabrik,
            ik_tolerance_mm: 0.5,
            ik_max_iterations: 100,
            axes: [
                AxisParams {
                    name: String::from("base"),
                    step_pin: 11,
                    dir_pin: 10,
                    hall_pin: 2,
                    acceleration_steps_s2: 200.0,
                    max_speed_steps_s: 500.0,
                    microstep_res: 4,
                    gear_reduction: -4.0,
                    seek_speed_steps_s: 500.0,
                    max_seek_steps: None,
                },
                AxisParams {
                    name: String::from("shoulder"),
                    step_pin: 9,
                    dir_pin: 8,
                    hall_pin: 3,
                    acceleration_steps_s2: 1000.0,
                    max_speed_steps_s: 4000.0,
                    microstep_res: 4,
                    gear_reduction: 100.0,
                    seek_speed_steps_s: -2000.0,
                    max_seek_steps: None,
                },
            ],
            homing_order: [1, 0],
            indicator_pin: 7,
            indicator_pulse_ms: 200,
            sequence: vec![
                ArmCmd::Position {
                    x_mm: 100.0,
                    y_mm: 100.0,
                },
                ArmCmd::Position {
                    x_mm: 200.0,
                    y_mm: 200.0,
                },
            ],
            dwell_ms: 2000,
        }
    }
}

impl AxisParams {
    fn validate(&self) -> Result<(), ParamsError> {
        let invalid = |field| {
            Err(ParamsError::InvalidAxis {
                axis: self.name.clone(),
                field,
            })
        };

        if !(self.acceleration_steps_s2 > 0.0) {
            return invalid("acceleration");
        }
        if !(self.max_speed_steps_s > 0.0) {
            return invalid("maximum speed");
        }
        if self.microstep_res == 0 {
            return invalid("microstep resolution");
        }
        if self.gear_reduction == 0.0 || !self.gear_reduction.is_finite() {
            return invalid("gear reduction");
        }
        if self.seek_speed_steps_s == 0.0 || !self.seek_speed_steps_s.is_finite() {
            return invalid("seek speed");
        }
        if self.max_seek_steps == Some(0) {
            return invalid("maximum seek travel");
        }

        Ok(())
    }
}

impl Default for AxisParams {
    fn default() -> Self {
        Self {
            name: String::from("axis"),
            step_pin: 0,
            dir_pin: 0,
            hall_pin: 0,
            acceleration_steps_s2: 1000.0,
            max_speed_steps_s: 1000.0,
            microstep_res: 1,
            gear_reduction: 1.0,
            seek_speed_steps_s: 100.0,
            max_seek_steps: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Whether `order` contains every index in `0..order.len()` exactly once.
pub fn is_permutation(order: &[usize]) -> bool {
    let mut seen = vec![false; order.len()];

    for &i in order {
        match seen.get_mut(i) {
            Some(s) if !*s => *s = true,
            _ => return false,
        }
    }

    true
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
