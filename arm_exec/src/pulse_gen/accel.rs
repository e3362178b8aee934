//! Software-timed trapezoidal step generator
//!
//! Step intervals follow David Austin's recurrence from "Generate stepper-motor speed profiles in
//! real time" (Embedded Systems Programming, 2005), the same scheme used by the Arduino
//! AccelStepper library. Speed ramps up at the configured acceleration, cruises at the maximum
//! speed and ramps down so that the motor stops on the target.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::digital::v2::OutputPin;

use super::{Clock, Direction, PulseGenError, PulseGenerator};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MICROS_PER_SECOND: f64 = 1e6;

/// Correction factor applied to the first step interval (Austin, eq. 15).
const C0_CORRECTION: f64 = 0.676;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Acceleration-limited pulse generator driving a step/direction driver (e.g. A4988).
///
/// Timing is done entirely by polling: [`PulseGenerator::run`] must be called at least once per
/// step interval or the motor will fall behind the profile.
pub struct AccelStepper<STEP, DIR, CLK> {
    step_pin: STEP,
    dir_pin: DIR,
    clock: CLK,

    current_pos: i64,
    target_pos: i64,

    /// Signed speed, steps/second
    speed: f64,
    max_speed: f64,
    acceleration: f64,

    /// Current interval between steps, zero when stopped
    step_interval_us: u64,
    last_step_us: u64,

    /// Step counter within the current ramp, negative while decelerating
    n: i64,
    c0: f64,
    cn: f64,
    cmin: f64,

    direction: Direction,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<STEP, DIR, CLK> AccelStepper<STEP, DIR, CLK>
where
    STEP: OutputPin,
    DIR: OutputPin,
    CLK: Clock,
{
    /// Create a new generator, stopped at position zero with a maximum speed and acceleration of
    /// one step/second(^2).
    pub fn new(step_pin: STEP, dir_pin: DIR, clock: CLK) -> Self {
        let mut stepper = Self {
            step_pin,
            dir_pin,
            clock,
            current_pos: 0,
            target_pos: 0,
            speed: 0.0,
            max_speed: 0.0,
            acceleration: 0.0,
            step_interval_us: 0,
            last_step_us: 0,
            n: 0,
            c0: 0.0,
            cn: 0.0,
            cmin: 1.0,
            direction: Direction::Ccw,
        };

        stepper.set_max_speed(1.0);
        stepper.set_acceleration(1.0);

        stepper
    }

    /// Release the pins and clock.
    pub fn free(self) -> (STEP, DIR, CLK) {
        (self.step_pin, self.dir_pin, self.clock)
    }

    fn now_us(&self) -> u64 {
        self.clock.elapsed().as_micros() as u64
    }

    /// Recalculate the step interval after a step or a change of target.
    fn compute_new_speed(&mut self) {
        let distance_to = self.target_pos - self.current_pos;
        let steps_to_stop = ((self.speed * self.speed) / (2.0 * self.acceleration)) as i64;

        if distance_to == 0 && steps_to_stop <= 1 {
            // At the target and slow enough to stop
            self.step_interval_us = 0;
            self.speed = 0.0;
            self.n = 0;
            return;
        }

        if distance_to > 0 {
            // Target is ahead
            if self.n > 0 {
                // Accelerating, start decelerating if we would overshoot or are going the wrong
                // way
                if steps_to_stop >= distance_to || self.direction == Direction::Ccw {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0 {
                // Decelerating, accelerate again if there is room and we are going the right way
                if steps_to_stop < distance_to && self.direction == Direction::Cw {
                    self.n = -self.n;
                }
            }
        } else if distance_to < 0 {
            // Target is behind
            if self.n > 0 {
                if steps_to_stop >= -distance_to || self.direction == Direction::Cw {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0 {
                if steps_to_stop < -distance_to && self.direction == Direction::Ccw {
                    self.n = -self.n;
                }
            }
        }

        if self.n == 0 {
            // First step from rest
            self.cn = self.c0;
            self.direction = if distance_to > 0 {
                Direction::Cw
            } else {
                Direction::Ccw
            };
        } else {
            self.cn -= (2.0 * self.cn) / ((4.0 * self.n as f64) + 1.0);
            self.cn = self.cn.max(self.cmin);
        }
        self.n += 1;
        self.step_interval_us = self.cn as u64;
        self.speed = MICROS_PER_SECOND / self.cn;
        if self.direction == Direction::Ccw {
            self.speed = -self.speed;
        }
    }

    /// Emit one step pulse in the current direction.
    fn pulse(&mut self) -> Result<(), PulseGenError> {
        let dir = match self.direction {
            Direction::Cw => self.dir_pin.set_high(),
            Direction::Ccw => self.dir_pin.set_low(),
        };
        dir.map_err(|_| PulseGenError::DirPin)?;

        self.step_pin.set_high().map_err(|_| PulseGenError::StepPin)?;
        self.step_pin.set_low().map_err(|_| PulseGenError::StepPin)
    }
}

impl<STEP, DIR, CLK> PulseGenerator for AccelStepper<STEP, DIR, CLK>
where
    STEP: OutputPin,
    DIR: OutputPin,
    CLK: Clock,
{
    fn move_to(&mut self, abs_steps: i64) {
        if self.target_pos != abs_steps {
            self.target_pos = abs_steps;
            self.compute_new_speed();
        }
    }

    fn run(&mut self) -> Result<bool, PulseGenError> {
        if self.run_speed()? {
            self.compute_new_speed();
        }

        Ok(self.speed != 0.0 || self.distance_to_go() != 0)
    }

    fn is_running(&self) -> bool {
        !(self.speed == 0.0 && self.target_pos == self.current_pos)
    }

    fn set_speed(&mut self, steps_per_s: f64) {
        if steps_per_s == self.speed {
            return;
        }

        let speed = steps_per_s.max(-self.max_speed).min(self.max_speed);

        if speed == 0.0 {
            self.step_interval_us = 0;
        } else {
            self.step_interval_us = (MICROS_PER_SECOND / speed).abs() as u64;
            self.direction = if speed > 0.0 {
                Direction::Cw
            } else {
                Direction::Ccw
            };
        }
        self.speed = speed;
    }

    fn run_speed(&mut self) -> Result<bool, PulseGenError> {
        if self.step_interval_us == 0 {
            return Ok(false);
        }

        let now = self.now_us();
        if now.saturating_sub(self.last_step_us) < self.step_interval_us {
            return Ok(false);
        }

        match self.direction {
            Direction::Cw => self.current_pos += 1,
            Direction::Ccw => self.current_pos -= 1,
        }
        self.pulse()?;
        self.last_step_us = now;

        Ok(true)
    }

    fn set_current_position(&mut self, steps: i64) {
        self.target_pos = steps;
        self.current_pos = steps;
        self.n = 0;
        self.step_interval_us = 0;
        self.speed = 0.0;
    }

    fn current_position(&self) -> i64 {
        self.current_pos
    }

    fn target_position(&self) -> i64 {
        self.target_pos
    }

    fn speed(&self) -> f64 {
        self.speed
    }

    fn set_max_speed(&mut self, steps_per_s: f64) {
        let steps_per_s = steps_per_s.abs();

        if self.max_speed != steps_per_s {
            self.max_speed = steps_per_s;
            self.cmin = MICROS_PER_SECOND / steps_per_s;

            // Recompute n from the current speed and re-ramp if we were accelerating
            if self.n > 0 {
                self.n = ((self.speed * self.speed) / (2.0 * self.acceleration)) as i64;
                self.compute_new_speed();
            }
        }
    }

    fn set_acceleration(&mut self, steps_per_s2: f64) {
        if steps_per_s2 == 0.0 {
            return;
        }
        let steps_per_s2 = steps_per_s2.abs();

        if self.acceleration != steps_per_s2 {
            // Rescale the ramp position so the current speed is kept (Austin, eq. 17)
            if self.acceleration > 0.0 {
                self.n = (self.n as f64 * (self.acceleration / steps_per_s2)) as i64;
            }
            self.c0 = C0_CORRECTION * (2.0 / steps_per_s2).sqrt() * MICROS_PER_SECOND;
            self.acceleration = steps_per_s2;
            self.compute_new_speed();
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
