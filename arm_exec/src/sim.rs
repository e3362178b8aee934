//! # Simulated physical I/O
//!
//! Stand-ins for the digital pins and delay provider used when running without the arm attached,
//! and by the unit tests. Each type is a cheap handle onto shared state, so a clone kept by the
//! caller observes what the firmware did with the original.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{cell::Cell, convert::Infallible, rc::Rc, time::Duration};

use embedded_hal::{
    blocking::delay::DelayMs,
    digital::v2::{InputPin, OutputPin},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Output pin which records its level and how many times it was driven high.
#[derive(Debug, Clone, Default)]
pub struct SimOutputPin {
    high: Rc<Cell<bool>>,
    rising_edges: Rc<Cell<u64>>,
}

/// Active-low hall effect sensor which sees the magnet after a set number of reads.
///
/// Each trigger is reported once, after which the count starts again. Homing stops reading at the
/// first low, so every homing of an axis seeks for the same number of reads.
#[derive(Debug, Clone)]
pub struct SimHallSensor {
    trigger_after: Option<u64>,
    reads: Rc<Cell<u64>>,
    since_trigger: Rc<Cell<u64>>,
}

/// Delay provider which records the total time requested, optionally sleeping for real.
#[derive(Debug, Clone, Default)]
pub struct SimDelay {
    sleep: bool,
    total_ms: Rc<Cell<u64>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimOutputPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set_high(&self) -> bool {
        self.high.get()
    }

    pub fn rising_edges(&self) -> u64 {
        self.rising_edges.get()
    }
}

impl OutputPin for SimOutputPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high.get() {
            self.rising_edges.set(self.rising_edges.get() + 1);
        }
        self.high.set(true);
        Ok(())
    }
}

impl SimHallSensor {
    /// Create a sensor which reads low on every `trigger_after`th read. With
    /// `None` the magnet is never seen.
    pub fn new(trigger_after: Option<u64>) -> Self {
        Self {
            trigger_after,
            reads: Rc::new(Cell::new(0)),
            since_trigger: Rc::new(Cell::new(0)),
        }
    }

    /// Total number of times the sensor has been read.
    pub fn reads(&self) -> u64 {
        self.reads.get()
    }
}

impl InputPin for SimHallSensor {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        self.is_low().map(|low| !low)
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        self.reads.set(self.reads.get() + 1);
        let since_trigger = self.since_trigger.get() + 1;

        let low = match self.trigger_after {
            Some(n) => since_trigger >= n,
            None => false,
        };
        self.since_trigger.set(if low { 0 } else { since_trigger });

        Ok(low)
    }
}

impl SimDelay {
    /// A delay which returns immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A delay which blocks the thread for the requested time.
    pub fn sleeping() -> Self {
        Self {
            sleep: true,
            ..Self::default()
        }
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms.get()
    }
}

impl DelayMs<u32> for SimDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms.set(self.total_ms.get() + ms as u64);
        if self.sleep {
            std::thread::sleep(Duration::from_millis(ms as u64));
        }
    }
}
