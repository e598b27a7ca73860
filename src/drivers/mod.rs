//! Peripheral drivers and one-shot hardware initialisation.
//!
//! Drivers own a pin (or borrow the shared I²C bus per call) and know
//! nothing about machine states; `adapters::hardware` stitches them into
//! the application ports.

pub mod ads1115;
pub mod ads1232;
pub mod heater;
pub mod hw_init;
pub mod indicators;
pub mod level_probe;
pub mod pump;
pub mod watchdog;
