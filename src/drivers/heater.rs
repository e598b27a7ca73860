//! Heater solid-state relay.
//!
//! The control loop already turns its duty into slow-PWM on/off decisions,
//! so this driver only switches the SSR and counts switching edges for
//! the DEBUG status readout.

use crate::drivers::hw_init;
use crate::pins;

pub struct HeaterSsr {
    on: bool,
    switch_count: u32,
}

impl Default for HeaterSsr {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaterSsr {
    pub fn new() -> Self {
        hw_init::gpio_write(pins::HEATER_SSR_GPIO, false);
        Self {
            on: false,
            switch_count: 0,
        }
    }

    pub fn set(&mut self, on: bool) {
        if on == self.on {
            return;
        }
        hw_init::gpio_write(pins::HEATER_SSR_GPIO, on);
        self.on = on;
        self.switch_count = self.switch_count.wrapping_add(1);
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Off/on edges since boot.
    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }
}
