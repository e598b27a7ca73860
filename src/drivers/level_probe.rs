//! LM1830 boiler level-probe IC.
//!
//! The IC is only powered while a measurement runs; its output is read
//! through `InputPin::BoilerLevel`.  The measurement sequencing lives in
//! `sensors::boiler_level`; this is just the enable line.

use crate::drivers::hw_init;
use crate::pins;

pub struct LevelProbe {
    enabled: bool,
}

impl Default for LevelProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelProbe {
    pub fn new() -> Self {
        hw_init::gpio_write(pins::ENABLE_LM1830_GPIO, false);
        Self { enabled: false }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            hw_init::gpio_write(pins::ENABLE_LM1830_GPIO, enabled);
            self.enabled = enabled;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
