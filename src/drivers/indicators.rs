//! Front-panel indicator engine and LED/buzzer driver.
//!
//! State handlers only name an [`Indication`]; the engine turns it into
//! time-varying levels for the three panel LEDs and the buzzer.  The
//! service calls `tick()` once per control cycle and hands the result to
//! the [`ActuatorPort`](crate::app::ports::ActuatorPort).
//!
//! ## Patterns
//!
//! | Indication  | Main    | Heater     | Water      | Buzzer                     |
//! |-------------|---------|------------|------------|----------------------------|
//! | Error       | 1 Hz    | 1 Hz       | 1 Hz       | 1 Hz                       |
//! | WaterEmpty  | on      | off        | 1 Hz       | double beep every 3.95 s   |
//! | Heating     | on      | 1 Hz       | on         | -                          |
//! | Ready       | on      | on         | on         | -                          |
//! | Standby     | 500 ms flash every 5 s | off | off | -                        |
//! | Manual      | `LedLevels` as commanded              ||| -                  |
//!
//! The pattern phase restarts whenever the indication changes, so every
//! pattern begins with its "on" half.

use crate::drivers::hw_init;
use crate::fsm::context::{Indication, LedLevels};
use crate::pins;

/// Half period of every blinking pattern.
pub const BLINK_HALF_PERIOD_MS: u64 = 500;

const WATER_BEEP_CYCLE_MS: u64 = 3950;
const WATER_BEEP_MS: u64 = 150;

const STANDBY_CYCLE_MS: u64 = 5000;
const STANDBY_FLASH_MS: u64 = 500;

/// Resolved panel output for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelLevels {
    pub main: bool,
    pub heater: bool,
    pub water: bool,
    pub buzzer: bool,
}

/// Pattern generator.  Stack-allocated, no heap.
pub struct IndicatorEngine {
    phase_start_ms: u64,
    active: Option<Indication>,
    levels: PanelLevels,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self {
            phase_start_ms: 0,
            active: None,
            levels: PanelLevels::default(),
        }
    }

    /// Advance to `now_ms` and return the levels for `indication`.
    /// [`Indication::Hold`] keeps the previous LED levels with the
    /// pattern buzzer silent.
    pub fn tick(&mut self, indication: Indication, manual: LedLevels, now_ms: u64) -> PanelLevels {
        if indication == Indication::Hold {
            self.levels.buzzer = false;
            return self.levels;
        }
        if self.active != Some(indication) {
            self.active = Some(indication);
            self.phase_start_ms = now_ms;
        }
        let phase = now_ms.saturating_sub(self.phase_start_ms);
        self.levels = Self::generate(indication, manual, phase);
        self.levels
    }

    /// Indication currently driving the panel.
    pub fn active(&self) -> Option<Indication> {
        self.active
    }

    fn generate(indication: Indication, manual: LedLevels, phase: u64) -> PanelLevels {
        let blink = (phase / BLINK_HALF_PERIOD_MS) % 2 == 0;
        match indication {
            Indication::Error => PanelLevels {
                main: blink,
                heater: blink,
                water: blink,
                buzzer: blink,
            },
            Indication::WaterEmpty => {
                let cycle = phase % WATER_BEEP_CYCLE_MS;
                let beep = cycle < WATER_BEEP_MS
                    || (2 * WATER_BEEP_MS..3 * WATER_BEEP_MS).contains(&cycle);
                PanelLevels {
                    main: true,
                    heater: false,
                    water: blink,
                    buzzer: beep,
                }
            }
            Indication::Heating => PanelLevels {
                main: true,
                heater: blink,
                water: true,
                buzzer: false,
            },
            Indication::Ready => PanelLevels {
                main: true,
                heater: true,
                water: true,
                buzzer: false,
            },
            Indication::Standby => PanelLevels {
                main: phase % STANDBY_CYCLE_MS < STANDBY_FLASH_MS,
                heater: false,
                water: false,
                buzzer: false,
            },
            Indication::Manual => PanelLevels {
                main: manual.main,
                heater: manual.heater,
                water: manual.water,
                buzzer: false,
            },
            Indication::Hold => PanelLevels::default(),
        }
    }
}

// ── GPIO side ─────────────────────────────────────────────────

/// LED and buzzer outputs.  Writes only on change.
pub struct FrontPanel {
    levels: PanelLevels,
}

impl Default for FrontPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontPanel {
    pub fn new() -> Self {
        let panel = Self {
            levels: PanelLevels::default(),
        };
        for gpio in [
            pins::LED_MAIN_GPIO,
            pins::LED_HEATER_GPIO,
            pins::LED_WATER_GPIO,
            pins::BUZZER_GPIO,
        ] {
            hw_init::gpio_write(gpio, false);
        }
        panel
    }

    pub fn set_main(&mut self, on: bool) {
        Self::write(&mut self.levels.main, pins::LED_MAIN_GPIO, on);
    }

    pub fn set_heater(&mut self, on: bool) {
        Self::write(&mut self.levels.heater, pins::LED_HEATER_GPIO, on);
    }

    pub fn set_water(&mut self, on: bool) {
        Self::write(&mut self.levels.water, pins::LED_WATER_GPIO, on);
    }

    pub fn set_buzzer(&mut self, on: bool) {
        Self::write(&mut self.levels.buzzer, pins::BUZZER_GPIO, on);
    }

    pub fn levels(&self) -> PanelLevels {
        self.levels
    }

    fn write(current: &mut bool, gpio: i32, on: bool) {
        if *current != on {
            hw_init::gpio_write(gpio, on);
            *current = on;
        }
    }
}
