//! # Axis control module
//!
//! Wraps one stepper-driven joint. Callers think only in output shaft degrees, the controller
//! hides the microstepping and gear reduction and hands absolute step targets to the
//! [`PulseGenerator`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod homing;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{debug, info, warn};
use serde::Serialize;

// Internal
use crate::{
    params::AxisParams,
    pulse_gen::{PulseGenError, PulseGenerator},
};
pub use homing::{HomingCfg, HomingState};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Full steps per revolution of the motor shaft. A property of the motors fitted to the arm, not
/// of any one axis.
pub const FULL_STEPS_PER_REV: f64 = 200.0;

/// Magnitude of the largest angle which can be commanded, in degrees. Commands must lie strictly
/// inside `(-MAX_ABS_ANGLE_DEG, MAX_ABS_ANGLE_DEG)`.
pub const MAX_ABS_ANGLE_DEG: f64 = 360.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A single independently controlled joint, as seen by the motion coordinator.
pub trait Axis {
    fn name(&self) -> &str;

    /// Set the absolute goal of the axis in output shaft degrees, returning the step target.
    fn set_angle(&mut self, angle_deg: f64) -> Result<i64, AxisCtrlError>;

    /// Whether the axis is still moving towards its last goal.
    fn is_running(&self) -> bool;

    /// Advance the axis by one scheduling tick. Never blocks.
    fn step(&mut self) -> Result<(), AxisCtrlError>;

    /// Drive the axis onto its homing sensor and define that point as zero. Blocks until the
    /// sensor triggers.
    fn zero<S, L, D>(
        &mut self,
        sensor: &S,
        indicator: &mut L,
        delay: &mut D,
        homing: &HomingCfg,
    ) -> Result<(), AxisCtrlError>
    where
        S: InputPin,
        L: OutputPin,
        D: DelayMs<u32>;

    /// Last commanded angle in degrees.
    fn angle_deg(&self) -> f64;

    /// Current absolute position in driver steps.
    fn position_steps(&self) -> i64;

    /// Current absolute step target.
    fn target_steps(&self) -> i64;

    /// Snapshot of the axis for diagnostics.
    fn status(&self) -> AxisStatus {
        AxisStatus {
            name: self.name().to_string(),
            angle_deg: self.angle_deg(),
            position_steps: self.position_steps(),
            target_steps: self.target_steps(),
            running: self.is_running(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Controller for one stepper axis.
pub struct AxisCtrl<P> {
    name: String,

    pulse_gen: P,

    /// Driver steps for one full turn of the output shaft. Negative when the gearing reverses the
    /// direction of rotation.
    steps_per_output_rotation: f64,

    angle_deg: f64,

    homing_state: HomingState,

    /// Steps taken in the current homing seek
    seek_steps: u64,
}

/// Snapshot of an axis for diagnostics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AxisStatus {
    pub name: String,
    pub angle_deg: f64,
    pub position_steps: i64,
    pub target_steps: i64,
    pub running: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during AxisCtrl operation.
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum AxisCtrlError {
    #[error("Angle of {0} degrees is outside the single revolution range (-360, 360)")]
    AngleOutOfRange(f64),

    #[error("Pulse generation failed: {0}")]
    PulseGen(#[from] PulseGenError),

    #[error("Could not read the homing sensor")]
    SensorRead,

    #[error("Could not write to the indicator output")]
    Indicator,

    #[error("Homing sensor did not trigger within {steps} seek steps")]
    HomingFailed { steps: u64 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P> AxisCtrl<P>
where
    P: PulseGenerator,
{
    /// Create a new axis controller, configuring the pulse generator's acceleration and maximum
    /// speed.
    ///
    /// The step position of the generator is left as is and should be treated as unknown until
    /// the axis has been zeroed.
    pub fn new(params: &AxisParams, mut pulse_gen: P) -> Self {
        pulse_gen.set_max_speed(params.max_speed_steps_s);
        pulse_gen.set_acceleration(params.acceleration_steps_s2);

        let steps_per_output_rotation =
            FULL_STEPS_PER_REV * params.microstep_res as f64 * params.gear_reduction;

        debug!(
            "{} axis: {} steps per output rotation",
            params.name, steps_per_output_rotation
        );

        Self {
            name: params.name.clone(),
            pulse_gen,
            steps_per_output_rotation,
            angle_deg: 0.0,
            homing_state: HomingState::Unhomed,
            seek_steps: 0,
        }
    }

    pub fn steps_per_output_rotation(&self) -> f64 {
        self.steps_per_output_rotation
    }

    pub fn homing_state(&self) -> HomingState {
        self.homing_state
    }

    pub fn pulse_gen(&self) -> &P {
        &self.pulse_gen
    }

    /// Absolute step target for an angle, relative to the last zero.
    pub fn angle_to_steps(&self, angle_deg: f64) -> i64 {
        (angle_deg / MAX_ABS_ANGLE_DEG * self.steps_per_output_rotation).round() as i64
    }
}

/// Check an angle can be commanded to an axis: finite and strictly inside (-360, 360) degrees.
pub fn check_angle(angle_deg: f64) -> Result<(), AxisCtrlError> {
    if angle_deg.is_finite() && angle_deg.abs() < MAX_ABS_ANGLE_DEG {
        Ok(())
    } else {
        Err(AxisCtrlError::AngleOutOfRange(angle_deg))
    }
}

impl<P> Axis for AxisCtrl<P>
where
    P: PulseGenerator,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn set_angle(&mut self, angle_deg: f64) -> Result<i64, AxisCtrlError> {
        if let Err(e) = check_angle(angle_deg) {
            warn!("Rejected {} axis goal of {} degrees", self.name, angle_deg);
            return Err(e);
        }

        if self.homing_state != HomingState::Done {
            debug!("{} axis commanded before it was zeroed", self.name);
        }

        info!("Setting {} axis goal to: {:.2} degrees", self.name, angle_deg);

        let motor_goal = self.angle_to_steps(angle_deg);
        info!("    Steps to complete: {}", motor_goal);

        self.pulse_gen.move_to(motor_goal);
        self.angle_deg = angle_deg;

        Ok(motor_goal)
    }

    fn is_running(&self) -> bool {
        self.pulse_gen.is_running()
    }

    fn step(&mut self) -> Result<(), AxisCtrlError> {
        self.pulse_gen.run()?;
        Ok(())
    }

    fn zero<S, L, D>(
        &mut self,
        sensor: &S,
        indicator: &mut L,
        delay: &mut D,
        homing: &HomingCfg,
    ) -> Result<(), AxisCtrlError>
    where
        S: InputPin,
        L: OutputPin,
        D: DelayMs<u32>,
    {
        self.begin_homing(homing.seek_speed_steps_s);

        while self.poll_homing(sensor, homing.max_seek_steps)? == HomingState::Seeking {}

        self.finish_homing(indicator, delay, homing.indicator_pulse_ms)
    }

    fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    fn position_steps(&self) -> i64 {
        self.pulse_gen.current_position()
    }

    fn target_steps(&self) -> i64 {
        self.pulse_gen.target_position()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        pulse_gen::SimPulseGen,
        sim::{SimDelay, SimHallSensor, SimOutputPin},
    };

    pub(crate) fn axis_params(gear_reduction: f64) -> AxisParams {
        AxisParams {
            name: String::from("test"),
            microstep_res: 4,
            gear_reduction,
            ..AxisParams::default()
        }
    }

    fn homing_cfg(max_seek_steps: Option<u64>) -> HomingCfg {
        HomingCfg {
            seek_speed_steps_s: 500.0,
            max_seek_steps,
            indicator_pulse_ms: 200,
        }
    }

    #[test]
    fn test_steps_per_output_rotation() {
        let base = AxisCtrl::new(&axis_params(-4.0), SimPulseGen::new());
        let shoulder = AxisCtrl::new(&axis_params(100.0), SimPulseGen::new());

        assert_eq!(base.steps_per_output_rotation(), -3200.0);
        assert_eq!(shoulder.steps_per_output_rotation(), 80000.0);
    }

    #[test]
    fn test_generator_configured() {
        let mut params = axis_params(100.0);
        params.acceleration_steps_s2 = 1000.0;
        params.max_speed_steps_s = 4000.0;

        let axis = AxisCtrl::new(&params, SimPulseGen::new());
        assert_eq!(axis.pulse_gen().acceleration(), 1000.0);
        assert_eq!(axis.pulse_gen().max_speed(), 4000.0);
    }

    #[test]
    fn test_set_angle_step_targets() {
        let mut base = AxisCtrl::new(&axis_params(-4.0), SimPulseGen::new());
        let mut shoulder = AxisCtrl::new(&axis_params(100.0), SimPulseGen::new());

        assert_eq!(base.set_angle(90.0), Ok(-800));
        assert_eq!(base.target_steps(), -800);
        assert_eq!(base.angle_deg(), 90.0);
        assert_eq!(base.set_angle(-180.0), Ok(1600));
        assert_eq!(base.set_angle(0.1), Ok(-1));

        assert_eq!(shoulder.set_angle(45.0), Ok(10000));
        assert_eq!(shoulder.set_angle(-359.9), Ok(-79978));
        assert_eq!(shoulder.set_angle(0.0036), Ok(1));

        // Fractional angles are kept, not truncated
        shoulder.set_angle(12.75).unwrap();
        assert_eq!(shoulder.angle_deg(), 12.75);
    }

    #[test]
    fn test_set_angle_is_absolute() {
        let mut axis = AxisCtrl::new(&axis_params(100.0), SimPulseGen::new());

        let first = axis.set_angle(30.0).unwrap();
        let second = axis.set_angle(30.0).unwrap();
        assert_eq!(first, second);

        // And still the same after moving there
        while axis.is_running() {
            axis.step().unwrap();
        }
        assert_eq!(axis.set_angle(30.0), Ok(first));
        assert!(!axis.is_running());
        assert_eq!(axis.position_steps(), first);
    }

    #[test]
    fn test_set_angle_out_of_range() {
        let mut axis = AxisCtrl::new(&axis_params(100.0), SimPulseGen::new());
        axis.set_angle(10.0).unwrap();

        assert_eq!(axis.set_angle(360.0), Err(AxisCtrlError::AngleOutOfRange(360.0)));
        assert_eq!(axis.set_angle(-360.0), Err(AxisCtrlError::AngleOutOfRange(-360.0)));
        assert!(matches!(
            axis.set_angle(f64::NAN),
            Err(AxisCtrlError::AngleOutOfRange(_))
        ));
        assert!(axis.set_angle(f64::INFINITY).is_err());

        // Rejected commands leave the previous goal in place
        assert_eq!(axis.angle_deg(), 10.0);
        assert_eq!(axis.target_steps(), axis.angle_to_steps(10.0));
    }

    #[test]
    fn test_zero_after_n_polls() {
        for n in &[1u64, 2, 17, 500] {
            let mut axis = AxisCtrl::new(&axis_params(-4.0), SimPulseGen::at_position(1234));
            axis.set_angle(45.0).unwrap();
            for _ in 0..10 {
                axis.step().unwrap();
            }

            let sensor = SimHallSensor::new(Some(*n));
            let mut led = SimOutputPin::new();
            let led_handle = led.clone();
            let mut delay = SimDelay::new();

            axis.zero(&sensor, &mut led, &mut delay, &homing_cfg(None))
                .unwrap();

            assert_eq!(axis.position_steps(), 0);
            assert_eq!(axis.target_steps(), 0);
            assert_eq!(axis.angle_deg(), 0.0);
            assert!(!axis.is_running());
            assert_eq!(axis.homing_state(), HomingState::Done);
            assert_eq!(sensor.reads(), *n);

            // One 200 ms flash of the indicator
            assert_eq!(led_handle.rising_edges(), 1);
            assert!(!led_handle.is_set_high());
            assert_eq!(delay.total_ms(), 200);
        }
    }

    #[test]
    fn test_zero_seeks_at_constant_speed() {
        let mut params = axis_params(100.0);
        params.max_speed_steps_s = 4000.0;
        let mut axis = AxisCtrl::new(&params, SimPulseGen::new());

        let sensor = SimHallSensor::new(Some(11));
        let mut cfg = homing_cfg(None);
        cfg.seek_speed_steps_s = -2000.0;

        axis.zero(&sensor, &mut SimOutputPin::new(), &mut SimDelay::new(), &cfg)
            .unwrap();

        // Ten untriggered reads, each followed by one step in the negative direction
        assert_eq!(axis.pulse_gen().steps_taken, 10);
        assert_eq!(axis.position_steps(), 0);
    }

    #[test]
    fn test_rehoming_seeks_again() {
        let mut axis = AxisCtrl::new(&axis_params(-4.0), SimPulseGen::at_position(300));
        let sensor = SimHallSensor::new(Some(6));
        let cfg = homing_cfg(None);

        axis.zero(&sensor, &mut SimOutputPin::new(), &mut SimDelay::new(), &cfg)
            .unwrap();
        assert_eq!(axis.pulse_gen().steps_taken, 5);

        // Move off zero and home a second time, the seek runs again before the trigger
        axis.set_angle(10.0).unwrap();
        while axis.is_running() {
            axis.step().unwrap();
        }
        let moved = axis.pulse_gen().steps_taken;

        axis.zero(&sensor, &mut SimOutputPin::new(), &mut SimDelay::new(), &cfg)
            .unwrap();
        assert_eq!(axis.pulse_gen().steps_taken, moved + 5);
        assert_eq!(axis.position_steps(), 0);
        assert_eq!(sensor.reads(), 12);
    }

    #[test]
    fn test_zero_bounded_seek_fails() {
        let mut axis = AxisCtrl::new(&axis_params(100.0), SimPulseGen::new());
        let sensor = SimHallSensor::new(None);
        let led = SimOutputPin::new();

        let result = axis.zero(
            &sensor,
            &mut led.clone(),
            &mut SimDelay::new(),
            &homing_cfg(Some(50)),
        );

        assert_eq!(result, Err(AxisCtrlError::HomingFailed { steps: 50 }));
        assert_eq!(axis.pulse_gen().steps_taken, 50);
        assert_eq!(axis.homing_state(), HomingState::Unhomed);
        assert!(!axis.is_running());
        assert_eq!(led.rising_edges(), 0);
        assert_eq!(axis.pulse_gen().speed(), 0.0);
    }
}
