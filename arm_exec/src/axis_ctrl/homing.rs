//! Homing of a single axis against its hall effect sensor

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use super::{AxisCtrl, AxisCtrlError};
use crate::pulse_gen::PulseGenerator;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// How one axis is homed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomingCfg {
    /// Constant speed of the seek towards the sensor. The sign gives the direction of travel.
    ///
    /// Units: steps/second
    pub seek_speed_steps_s: f64,

    /// Give up after this many seek steps without the sensor triggering. With `None` the seek
    /// never gives up, and a dead or miswired sensor hangs the caller forever.
    pub max_seek_steps: Option<u64>,

    /// How long the indicator is lit to confirm the axis was zeroed.
    ///
    /// Units: milliseconds
    pub indicator_pulse_ms: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Progress of an axis through homing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HomingState {
    /// Never zeroed, or the last homing attempt failed. Step positions are meaningless.
    Unhomed,

    /// Moving towards the sensor at constant speed.
    Seeking,

    /// The sensor has seen the magnet and the position has been zeroed, the confirmation has not
    /// been given yet.
    Triggered,

    /// Zeroed and confirmed.
    Done,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<P> AxisCtrl<P>
where
    P: PulseGenerator,
{
    /// Start seeking the sensor at the given constant speed.
    pub fn begin_homing(&mut self, seek_speed_steps_s: f64) {
        debug!(
            "{} axis seeking home at {} steps/s",
            self.name, seek_speed_steps_s
        );

        self.pulse_gen.set_speed(seek_speed_steps_s);
        self.seek_steps = 0;
        self.homing_state = HomingState::Seeking;
    }

    /// Advance homing by one poll. Does not block.
    ///
    /// While seeking the sensor is read once, and if it has not triggered the motor is given the
    /// chance to take one constant speed step. The sensor is active low: it floats high and the
    /// magnet pulls it low.
    pub fn poll_homing<S>(
        &mut self,
        sensor: &S,
        max_seek_steps: Option<u64>,
    ) -> Result<HomingState, AxisCtrlError>
    where
        S: InputPin,
    {
        if self.homing_state != HomingState::Seeking {
            return Ok(self.homing_state);
        }

        let triggered = match sensor.is_low() {
            Ok(t) => t,
            Err(_) => {
                self.abort_homing();
                return Err(AxisCtrlError::SensorRead);
            }
        };

        if triggered {
            self.pulse_gen.set_current_position(0);
            self.angle_deg = 0.0;
            self.homing_state = HomingState::Triggered;

            debug!("{} axis sensor triggered after {} steps", self.name, self.seek_steps);
        } else {
            match self.pulse_gen.run_speed() {
                Ok(true) => self.seek_steps += 1,
                Ok(false) => (),
                Err(e) => {
                    self.abort_homing();
                    return Err(e.into());
                }
            }

            if let Some(max) = max_seek_steps {
                if self.seek_steps >= max {
                    self.abort_homing();

                    error!(
                        "{} axis homing failed, sensor not seen after {} steps",
                        self.name, self.seek_steps
                    );
                    return Err(AxisCtrlError::HomingFailed {
                        steps: self.seek_steps,
                    });
                }
            }
        }

        Ok(self.homing_state)
    }

    /// Stop the seek where it is, leaving the axis unhomed and at rest.
    fn abort_homing(&mut self) {
        self.pulse_gen.set_speed(0.0);
        self.pulse_gen.move_to(self.pulse_gen.current_position());
        self.homing_state = HomingState::Unhomed;
    }

    /// Confirm a triggered homing by flashing the indicator. Blocks for the length of the flash.
    pub(crate) fn finish_homing<L, D>(
        &mut self,
        indicator: &mut L,
        delay: &mut D,
        pulse_ms: u32,
    ) -> Result<(), AxisCtrlError>
    where
        L: OutputPin,
        D: DelayMs<u32>,
    {
        info!("{} axis zeroed", self.name);

        indicator.set_high().map_err(|_| AxisCtrlError::Indicator)?;
        delay.delay_ms(pulse_ms);
        indicator.set_low().map_err(|_| AxisCtrlError::Indicator)?;

        self.homing_state = HomingState::Done;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{axis_ctrl::Axis, params::AxisParams, pulse_gen::SimPulseGen, sim::SimHallSensor};

    #[test]
    fn test_cooperative_homing() {
        let params = AxisParams {
            name: String::from("base"),
            ..AxisParams::default()
        };
        let mut axis = AxisCtrl::new(&params, SimPulseGen::at_position(-40));
        let sensor = SimHallSensor::new(Some(4));

        assert_eq!(axis.homing_state(), HomingState::Unhomed);
        // Polling without starting does nothing
        assert_eq!(axis.poll_homing(&sensor, None), Ok(HomingState::Unhomed));
        assert_eq!(sensor.reads(), 0);

        axis.begin_homing(100.0);
        for _ in 0..3 {
            assert_eq!(axis.poll_homing(&sensor, None), Ok(HomingState::Seeking));
        }
        assert_eq!(axis.position_steps(), -37);

        assert_eq!(axis.poll_homing(&sensor, None), Ok(HomingState::Triggered));
        assert_eq!(axis.position_steps(), 0);

        // Further polls do not read the sensor again
        assert_eq!(axis.poll_homing(&sensor, None), Ok(HomingState::Triggered));
        assert_eq!(sensor.reads(), 4);
    }

    /// Sensor whose reads always fail.
    struct FaultySensor;

    impl InputPin for FaultySensor {
        type Error = ();

        fn is_high(&self) -> Result<bool, Self::Error> {
            Err(())
        }

        fn is_low(&self) -> Result<bool, Self::Error> {
            Err(())
        }
    }

    fn commanded_axis() -> AxisCtrl<SimPulseGen> {
        let mut axis = AxisCtrl::new(&AxisParams::default(), SimPulseGen::new());

        // A goal which was never reached, the seek must not resume it afterwards
        assert_eq!(axis.set_angle(90.0), Ok(50));
        assert!(axis.is_running());
        axis
    }

    #[test]
    fn test_failed_homing_leaves_axis_at_rest() {
        let mut axis = commanded_axis();
        let sensor = SimHallSensor::new(None);

        axis.begin_homing(-100.0);
        for _ in 0..4 {
            assert_eq!(axis.poll_homing(&sensor, Some(5)), Ok(HomingState::Seeking));
        }
        assert_eq!(
            axis.poll_homing(&sensor, Some(5)),
            Err(AxisCtrlError::HomingFailed { steps: 5 })
        );

        // Exactly the permitted travel, then stopped where it is
        assert_eq!(axis.pulse_gen().steps_taken, 5);
        assert_eq!(axis.position_steps(), -5);
        assert_eq!(axis.target_steps(), -5);
        assert!(!axis.is_running());
        assert_eq!(axis.homing_state(), HomingState::Unhomed);

        // Stepping does not drag the axis back to the old goal
        axis.step().unwrap();
        assert_eq!(axis.position_steps(), -5);
        assert_eq!(axis.poll_homing(&sensor, Some(5)), Ok(HomingState::Unhomed));
    }

    #[test]
    fn test_sensor_fault_stops_seek() {
        let mut axis = commanded_axis();

        axis.begin_homing(100.0);
        assert_eq!(
            axis.poll_homing(&FaultySensor, None),
            Err(AxisCtrlError::SensorRead)
        );
        assert!(!axis.is_running());
        assert_eq!(axis.pulse_gen().speed(), 0.0);
        assert_eq!(axis.homing_state(), HomingState::Unhomed);
    }
}
