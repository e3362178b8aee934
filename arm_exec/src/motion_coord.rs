//! # Motion coordination module
//!
//! Owns every axis of the arm, fans commands out to them and provides the single point at which
//! the application waits for motion to finish.
//!
//! Axes are profiled independently, there is no attempt to make them arrive at the same time. A
//! new command is only accepted once every axis has finished the previous one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{debug, info};
use serde::Serialize;

// Internal
use crate::{
    axis_ctrl::{check_angle, Axis, AxisCtrlError, AxisStatus, HomingCfg},
    params::is_permutation,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Coordinator for a fixed set of `N` axes.
///
/// Besides the axes it owns the homing sensor of each axis, the indicator output shared by all of
/// them and the delay provider used for the indicator flash.
pub struct MotionCoord<A, S, L, D, const N: usize> {
    axes: [A; N],
    sensors: [S; N],
    homing: [HomingCfg; N],
    homing_order: [usize; N],
    indicator: L,
    delay: D,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Overall state of the arm's motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionState {
    /// At least one axis is still moving.
    Running,

    /// Every axis has reached its goal.
    Idle,
}

/// Possible errors that can occur during MotionCoord operation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MotionError {
    #[error("Expected {expected} angles, one per axis, found {found}")]
    AngleCountMismatch { expected: usize, found: usize },

    #[error("Cannot accept a new command while the axes are still moving")]
    Busy,

    #[error("Homing order {0:?} is not a permutation of the axis indices")]
    InvalidHomingOrder(Vec<usize>),

    #[error("Axis {index} ({name}): {source}")]
    Axis {
        index: usize,
        name: String,
        source: AxisCtrlError,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<A, S, L, D, const N: usize> MotionCoord<A, S, L, D, N>
where
    A: Axis,
    S: InputPin,
    L: OutputPin,
    D: DelayMs<u32>,
{
    /// Create a new coordinator.
    ///
    /// `sensors[i]` and `homing[i]` belong to `axes[i]`. `homing_order` lists the axis indices in
    /// the order they must be homed and has to be a permutation of `0..N`.
    pub fn new(
        axes: [A; N],
        sensors: [S; N],
        homing: [HomingCfg; N],
        homing_order: [usize; N],
        indicator: L,
        delay: D,
    ) -> Result<Self, MotionError> {
        if !is_permutation(&homing_order) {
            return Err(MotionError::InvalidHomingOrder(homing_order.to_vec()));
        }

        Ok(Self {
            axes,
            sensors,
            homing,
            homing_order,
            indicator,
            delay,
        })
    }

    pub fn axes(&self) -> &[A; N] {
        &self.axes
    }

    pub fn axis(&self, index: usize) -> Option<&A> {
        self.axes.get(index)
    }

    /// Status of every axis, in axis order.
    pub fn status(&self) -> Vec<AxisStatus> {
        self.axes.iter().map(|a| a.status()).collect()
    }

    /// Command every axis to an absolute angle, returning the step target of each.
    ///
    /// The whole command is checked before any axis is touched, so a rejected command never
    /// leaves the arm half commanded.
    pub fn command_all(&mut self, angles_deg: &[f64]) -> Result<[i64; N], MotionError> {
        if angles_deg.len() != N {
            return Err(MotionError::AngleCountMismatch {
                expected: N,
                found: angles_deg.len(),
            });
        }

        if !self.is_idle() {
            return Err(MotionError::Busy);
        }

        for (index, angle) in angles_deg.iter().enumerate() {
            check_angle(*angle).map_err(|e| self.axis_error(index, e))?;
        }

        let mut step_targets = [0; N];
        for index in 0..N {
            step_targets[index] = self.axes[index]
                .set_angle(angles_deg[index])
                .map_err(|e| self.axis_error(index, e))?;
        }

        Ok(step_targets)
    }

    /// Give every axis one scheduling tick and report whether any are still moving. Never blocks.
    pub fn poll(&mut self) -> Result<MotionState, MotionError> {
        let mut running = false;

        for index in 0..N {
            if let Err(e) = self.axes[index].step() {
                return Err(self.axis_error(index, e));
            }
            running |= self.axes[index].is_running();
        }

        Ok(if running {
            MotionState::Running
        } else {
            MotionState::Idle
        })
    }

    /// Whether no axis is moving.
    pub fn is_idle(&self) -> bool {
        self.axes.iter().all(|a| !a.is_running())
    }

    /// Poll all axes until every one of them has reached its goal, returning the number of polls
    /// taken.
    ///
    /// This busy-waits without yielding, nothing else runs while the arm moves.
    pub fn run_until_idle(&mut self) -> Result<u64, MotionError> {
        let mut cycles = 0;

        loop {
            cycles += 1;
            if self.poll()? == MotionState::Idle {
                break;
            }
        }

        debug!("Motion complete after {} cycles", cycles);

        Ok(cycles)
    }

    /// Home every axis, one at a time in the configured order.
    ///
    /// Blocks until all axes are zeroed. Without a seek bound on an axis a sensor which never
    /// triggers blocks forever.
    pub fn home_all(&mut self) -> Result<(), MotionError> {
        for &index in self.homing_order.iter() {
            info!("Homing {} axis", self.axes[index].name());

            let result = self.axes[index].zero(
                &self.sensors[index],
                &mut self.indicator,
                &mut self.delay,
                &self.homing[index],
            );

            if let Err(e) = result {
                return Err(self.axis_error(index, e));
            }
        }

        info!("All axes homed");

        Ok(())
    }

    fn axis_error(&self, index: usize, source: AxisCtrlError) -> MotionError {
        MotionError::Axis {
            index,
            name: self.axes[index].name().to_string(),
            source,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        axis_ctrl::AxisCtrl,
        params::AxisParams,
        pulse_gen::SimPulseGen,
        sim::{SimDelay, SimHallSensor, SimOutputPin},
    };
    use std::{cell::RefCell, rc::Rc};

    type CallLog = Rc<RefCell<Vec<String>>>;

    /// Axis which records every call and needs one step per degree of travel.
    struct MockAxis {
        name: String,
        log: CallLog,
        angle_deg: f64,
        remaining: u64,
        steps: u64,
    }

    impl MockAxis {
        fn new(name: &str, log: &CallLog) -> Self {
            Self {
                name: String::from(name),
                log: log.clone(),
                angle_deg: 0.0,
                remaining: 0,
                steps: 0,
            }
        }
    }

    impl Axis for MockAxis {
        fn name(&self) -> &str {
            &self.name
        }

        fn set_angle(&mut self, angle_deg: f64) -> Result<i64, AxisCtrlError> {
            self.log.borrow_mut().push(format!("set {} {}", self.name, angle_deg));
            self.remaining = (angle_deg - self.angle_deg).abs() as u64;
            self.angle_deg = angle_deg;
            Ok(angle_deg as i64)
        }

        fn is_running(&self) -> bool {
            self.remaining > 0
        }

        fn step(&mut self) -> Result<(), AxisCtrlError> {
            self.steps += 1;
            self.remaining = self.remaining.saturating_sub(1);
            Ok(())
        }

        fn zero<S2, L2, D2>(
            &mut self,
            _: &S2,
            _: &mut L2,
            _: &mut D2,
            homing: &HomingCfg,
        ) -> Result<(), AxisCtrlError>
        where
            S2: InputPin,
            L2: OutputPin,
            D2: DelayMs<u32>,
        {
            self.log
                .borrow_mut()
                .push(format!("zero {} {}", self.name, homing.seek_speed_steps_s));
            self.angle_deg = 0.0;
            Ok(())
        }

        fn angle_deg(&self) -> f64 {
            self.angle_deg
        }

        fn position_steps(&self) -> i64 {
            self.angle_deg as i64
        }

        fn target_steps(&self) -> i64 {
            self.angle_deg as i64
        }
    }

    fn homing(seek_speed_steps_s: f64, max_seek_steps: Option<u64>) -> HomingCfg {
        HomingCfg {
            seek_speed_steps_s,
            max_seek_steps,
            indicator_pulse_ms: 200,
        }
    }

    fn mock_coord(
        log: &CallLog,
        order: [usize; 2],
    ) -> Result<MotionCoord<MockAxis, SimHallSensor, SimOutputPin, SimDelay, 2>, MotionError> {
        MotionCoord::new(
            [MockAxis::new("base", log), MockAxis::new("shoulder", log)],
            [SimHallSensor::new(Some(1)), SimHallSensor::new(Some(1))],
            [homing(500.0, None), homing(-2000.0, None)],
            order,
            SimOutputPin::new(),
            SimDelay::new(),
        )
    }

    fn sim_axis(name: &str, gear_reduction: f64) -> AxisCtrl<SimPulseGen> {
        AxisCtrl::new(
            &AxisParams {
                name: String::from(name),
                microstep_res: 4,
                gear_reduction,
                ..AxisParams::default()
            },
            SimPulseGen::at_position(-77),
        )
    }

    #[test]
    fn test_home_all_order() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();

        coord.home_all().unwrap();

        // Shoulder (upper joint) strictly before the base
        assert_eq!(
            *log.borrow(),
            vec![
                String::from("zero shoulder -2000"),
                String::from("zero base 500")
            ]
        );
    }

    #[test]
    fn test_invalid_homing_order() {
        let log = CallLog::default();
        assert_eq!(
            mock_coord(&log, [0, 0]).err(),
            Some(MotionError::InvalidHomingOrder(vec![0, 0]))
        );
        assert!(mock_coord(&log, [0, 2]).is_err());
    }

    #[test]
    fn test_run_until_idle_waits_for_slowest() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();

        coord.command_all(&[5.0, 30.0]).unwrap();
        assert!(!coord.is_idle());

        let cycles = coord.run_until_idle().unwrap();

        // Base was done after 5 polls, the call still waited for the shoulder
        assert_eq!(cycles, 30);
        assert!(coord.is_idle());
        assert_eq!(coord.axis(0).unwrap().steps, 30);
        assert_eq!(coord.axis(1).unwrap().steps, 30);
    }

    #[test]
    fn test_command_length_mismatch() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();

        assert_eq!(
            coord.command_all(&[10.0]),
            Err(MotionError::AngleCountMismatch {
                expected: 2,
                found: 1
            })
        );
        assert!(coord.command_all(&[10.0, 20.0, 30.0]).is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_no_command_while_running() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();

        coord.command_all(&[10.0, 20.0]).unwrap();
        assert_eq!(coord.poll(), Ok(MotionState::Running));
        assert_eq!(coord.command_all(&[0.0, 0.0]), Err(MotionError::Busy));

        coord.run_until_idle().unwrap();
        assert_eq!(coord.command_all(&[0.0, 0.0]), Ok([0, 0]));
    }

    #[test]
    fn test_no_partial_command() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();

        let result = coord.command_all(&[10.0, 400.0]);
        assert_eq!(
            result,
            Err(MotionError::Axis {
                index: 1,
                name: String::from("shoulder"),
                source: AxisCtrlError::AngleOutOfRange(400.0)
            })
        );

        // The valid angle for the base was not sent either
        assert!(log.borrow().is_empty());
        assert!(coord.is_idle());
    }

    #[test]
    fn test_command_and_run_sim_axes() {
        let mut coord = MotionCoord::new(
            [sim_axis("base", -4.0), sim_axis("shoulder", 100.0)],
            [SimHallSensor::new(Some(3)), SimHallSensor::new(Some(5))],
            [homing(500.0, None), homing(-2000.0, None)],
            [1, 0],
            SimOutputPin::new(),
            SimDelay::new(),
        )
        .unwrap();

        coord.home_all().unwrap();
        for axis in coord.axes() {
            assert_eq!(axis.position_steps(), 0);
        }

        let targets = coord.command_all(&[90.0, 45.0]).unwrap();
        assert_eq!(targets, [-800, 10000]);

        let cycles = coord.run_until_idle().unwrap();
        assert_eq!(cycles, 10000);

        let base = coord.axis(0).unwrap();
        let shoulder = coord.axis(1).unwrap();
        assert_eq!(base.position_steps(), -800);
        assert_eq!(shoulder.position_steps(), 10000);
        assert_eq!(base.angle_deg(), 90.0);
        assert_eq!(shoulder.angle_deg(), 45.0);
        assert_eq!(coord.poll(), Ok(MotionState::Idle));
    }

    #[test]
    fn test_home_all_indicator_and_failure() {
        let indicator = SimOutputPin::new();
        let delay = SimDelay::new();
        let mut coord = MotionCoord::new(
            [sim_axis("base", -4.0), sim_axis("shoulder", 100.0)],
            [SimHallSensor::new(None), SimHallSensor::new(Some(2))],
            [homing(500.0, Some(100)), homing(-2000.0, None)],
            [1, 0],
            indicator.clone(),
            delay.clone(),
        )
        .unwrap();

        // Shoulder homes and flashes, then the base's dead sensor gives up
        assert_eq!(
            coord.home_all(),
            Err(MotionError::Axis {
                index: 0,
                name: String::from("base"),
                source: AxisCtrlError::HomingFailed { steps: 100 }
            })
        );
        assert_eq!(indicator.rising_edges(), 1);
        assert_eq!(delay.total_ms(), 200);
        assert_eq!(coord.axis(1).unwrap().position_steps(), 0);
    }

    #[test]
    fn test_failed_homing_leaves_arm_commandable() {
        let mut coord = MotionCoord::new(
            [sim_axis("base", -4.0), sim_axis("shoulder", 100.0)],
            [SimHallSensor::new(None), SimHallSensor::new(None)],
            [homing(500.0, Some(50)), homing(-2000.0, Some(50))],
            [1, 0],
            SimOutputPin::new(),
            SimDelay::new(),
        )
        .unwrap();

        assert!(coord.home_all().is_err());

        // The shoulder stopped where the seek gave up, not back at its power-on position
        let shoulder = coord.axis(1).unwrap();
        assert_eq!(shoulder.position_steps(), -127);
        assert_eq!(shoulder.target_steps(), -127);
        assert!(coord.is_idle());
        assert_eq!(coord.run_until_idle(), Ok(1));
        assert_eq!(coord.axis(1).unwrap().position_steps(), -127);

        assert_eq!(coord.command_all(&[0.0, 0.0]), Ok([0, 0]));
    }

    #[test]
    fn test_status() {
        let log = CallLog::default();
        let mut coord = mock_coord(&log, [1, 0]).unwrap();
        coord.command_all(&[5.0, 0.0]).unwrap();

        let status = coord.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].name, "base");
        assert_eq!(status[0].angle_deg, 5.0);
        assert!(status[0].running);
        assert!(!status[1].running);
    }
}
