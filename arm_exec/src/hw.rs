//! # Raspberry Pi GPIO binding
//!
//! Hands out the physical pins of the arm as `embedded-hal` pins, using the BCM numbering.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use rppal::{
    gpio::{Gpio, InputPin, OutputPin},
    hal::Delay,
};

use crate::params::AxisParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Access to the GPIO peripheral.
pub struct Hw {
    gpio: Gpio,
}

/// The pins belonging to one axis.
pub struct AxisPins {
    pub step: OutputPin,
    pub dir: OutputPin,
    pub hall: InputPin,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("Could not access the GPIO peripheral: {0}")]
    GpioInit(rppal::gpio::Error),

    #[error("Could not acquire BCM pin {0}: {1}")]
    Pin(u8, rppal::gpio::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Hw {
    pub fn new() -> Result<Self, HwError> {
        Ok(Self {
            gpio: Gpio::new().map_err(HwError::GpioInit)?,
        })
    }

    /// Acquire an output pin, starting low.
    pub fn output(&self, bcm: u8) -> Result<OutputPin, HwError> {
        debug!("Acquiring output pin {}", bcm);

        self.gpio
            .get(bcm)
            .map(|p| p.into_output_low())
            .map_err(|e| HwError::Pin(bcm, e))
    }

    /// Acquire an input pin. The pull-up keeps a disconnected hall sensor reading as untriggered.
    pub fn input(&self, bcm: u8) -> Result<InputPin, HwError> {
        debug!("Acquiring input pin {}", bcm);

        self.gpio
            .get(bcm)
            .map(|p| p.into_input_pullup())
            .map_err(|e| HwError::Pin(bcm, e))
    }

    /// Acquire the step, direction and hall sensor pins of an axis.
    pub fn axis_pins(&self, params: &AxisParams) -> Result<AxisPins, HwError> {
        Ok(AxisPins {
            step: self.output(params.step_pin)?,
            dir: self.output(params.dir_pin)?,
            hall: self.input(params.hall_pin)?,
        })
    }

    pub fn delay(&self) -> Delay {
        Delay::new()
    }
}
