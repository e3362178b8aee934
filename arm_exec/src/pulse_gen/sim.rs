//! Simulated pulse generator

use super::{PulseGenError, PulseGenerator};

/// A pulse generator with no timing or acceleration: each poll moves one step.
///
/// Used in place of [`super::AccelStepper`] when running without hardware and in tests, where a
/// deterministic number of polls per move is wanted.
#[derive(Debug, Default, Clone)]
pub struct SimPulseGen {
    current_pos: i64,
    target_pos: i64,
    speed: f64,
    max_speed: f64,
    acceleration: f64,

    /// Number of times the generator has been polled
    pub polls: u64,

    /// Number of steps taken since creation
    pub steps_taken: u64,
}

impl SimPulseGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator whose power-on position is not zero, as is the case for a real motor
    /// before homing.
    pub fn at_position(steps: i64) -> Self {
        Self {
            current_pos: steps,
            target_pos: steps,
            ..Self::default()
        }
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    fn step_towards(&mut self, delta: i64) {
        self.current_pos += delta.signum();
        self.steps_taken += 1;
    }
}

impl PulseGenerator for SimPulseGen {
    fn move_to(&mut self, abs_steps: i64) {
        self.target_pos = abs_steps;
    }

    fn run(&mut self) -> Result<bool, PulseGenError> {
        self.polls += 1;

        let remaining = self.distance_to_go();
        if remaining != 0 {
            self.step_towards(remaining);
        }

        Ok(self.is_running())
    }

    fn is_running(&self) -> bool {
        self.current_pos != self.target_pos
    }

    fn set_speed(&mut self, steps_per_s: f64) {
        self.speed = if self.max_speed > 0.0 {
            steps_per_s.max(-self.max_speed).min(self.max_speed)
        } else {
            steps_per_s
        };
    }

    fn run_speed(&mut self) -> Result<bool, PulseGenError> {
        self.polls += 1;

        if self.speed == 0.0 {
            return Ok(false);
        }

        self.step_towards(if self.speed > 0.0 { 1 } else { -1 });
        Ok(true)
    }

    fn set_current_position(&mut self, steps: i64) {
        self.current_pos = steps;
        self.target_pos = steps;
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
        self.max_speed = steps_per_s.abs();
    }

    fn set_acceleration(&mut self, steps_per_s2: f64) {
        self.acceleration = steps_per_s2.abs();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_one_step_per_poll() {
        let mut sim = SimPulseGen::new();

        sim.move_to(-3);
        assert_eq!(sim.run(), Ok(true));
        assert_eq!(sim.run(), Ok(true));
        assert_eq!(sim.run(), Ok(false));
        assert_eq!(sim.current_position(), -3);

        // Polls at the target do nothing
        assert_eq!(sim.run(), Ok(false));
        assert_eq!(sim.steps_taken, 3);
        assert_eq!(sim.polls, 4);
    }

    #[test]
    fn test_run_speed() {
        let mut sim = SimPulseGen::at_position(10);
        sim.set_max_speed(100.0);

        sim.set_speed(-400.0);
        assert_eq!(sim.speed(), -100.0);
        for _ in 0..4 {
            assert_eq!(sim.run_speed(), Ok(true));
        }
        assert_eq!(sim.current_position(), 6);

        sim.set_current_position(0);
        assert_eq!(sim.run_speed(), Ok(false));
        assert!(!sim.is_running());
    }
}
