//! GPIO / peripheral pin assignments for the espresso controller board
//! (Arduino Nano ESP32 footprint, ESP32-S3).
//!
//! Single source of truth: every driver and the DEBUG `readpin`/`writepin`
//! commands reference this module rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Digital inputs
// ---------------------------------------------------------------------------

/// LM1830 level-probe output (D1).  HIGH = water touching the probe.
pub const BOILER_LEVEL_GPIO: i32 = 43;
/// Reservoir float switch (D3).  LOW = reservoir empty.
pub const WATER_DETECTOR_GPIO: i32 = 6;
/// Brew temperature selector, position 1 (D9).
pub const THREE_WAY_SWITCH1_GPIO: i32 = 18;
/// Brew temperature selector, position 2 (D11).
pub const THREE_WAY_SWITCH2_GPIO: i32 = 38;
/// Coffee / steam selector (D10).  HIGH = steam.
pub const TWO_WAY_SWITCH_GPIO: i32 = 21;
/// Brew lever micro-switch (A6).  LOW = lever lifted.
pub const BREW_SWITCH_GPIO: i32 = 13;
/// Triac zero-cross detector (D13).
pub const ZERO_CROSS_GPIO: i32 = 48;

// ---------------------------------------------------------------------------
// Digital outputs
// ---------------------------------------------------------------------------

/// LM1830 enable (D0).
pub const ENABLE_LM1830_GPIO: i32 = 44;
/// Piezo buzzer (A1).
pub const BUZZER_GPIO: i32 = 2;
/// Front-panel LEDs.
pub const LED_MAIN_GPIO: i32 = 9;
pub const LED_HEATER_GPIO: i32 = 3;
pub const LED_WATER_GPIO: i32 = 8;
/// Boiler fill solenoid relay (A3).
pub const FILL_VALVE_GPIO: i32 = 4;
/// Pump (coffee) relay (D7).
pub const PUMP_RELAY_GPIO: i32 = 10;
/// Heater solid-state relay (A7).
pub const HEATER_SSR_GPIO: i32 = 14;
/// Triac gate for pump phase control (A0).
pub const PUMP_TRIAC_GPIO: i32 = 1;

// ---------------------------------------------------------------------------
// ADS1232 load-cell ADC (bit-banged)
// ---------------------------------------------------------------------------

pub const ADS1232_SCLK_GPIO: i32 = 7;
pub const ADS1232_DOUT_GPIO: i32 = 47;

// ---------------------------------------------------------------------------
// I²C bus: ADS1115 thermistor/pressure ADC and PCF8574 scale control
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 11;
pub const I2C_SCL_GPIO: i32 = 12;
pub const I2C_FREQ_HZ: u32 = 400_000;
pub const ADS1115_ADDR: u8 = 0x48;
pub const PCF8574_ADDR: u8 = 0x38;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 dimmer levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;

// ---------------------------------------------------------------------------
// Logical pin names
// ---------------------------------------------------------------------------

/// Level-sensed inputs the core reads through `SensorPort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPin {
    BoilerLevel,
    WaterDetector,
    ThreeWaySwitch1,
    ThreeWaySwitch2,
    TwoWaySwitch,
    BrewSwitch,
}

impl InputPin {
    pub const ALL: [Self; 6] = [
        Self::BoilerLevel,
        Self::WaterDetector,
        Self::ThreeWaySwitch1,
        Self::ThreeWaySwitch2,
        Self::TwoWaySwitch,
        Self::BrewSwitch,
    ];

    pub const fn gpio(self) -> i32 {
        match self {
            Self::BoilerLevel => BOILER_LEVEL_GPIO,
            Self::WaterDetector => WATER_DETECTOR_GPIO,
            Self::ThreeWaySwitch1 => THREE_WAY_SWITCH1_GPIO,
            Self::ThreeWaySwitch2 => THREE_WAY_SWITCH2_GPIO,
            Self::TwoWaySwitch => TWO_WAY_SWITCH_GPIO,
            Self::BrewSwitch => BREW_SWITCH_GPIO,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::BoilerLevel => "boiler_level",
            Self::WaterDetector => "water_detector",
            Self::ThreeWaySwitch1 => "three_way_switch1",
            Self::ThreeWaySwitch2 => "three_way_switch2",
            Self::TwoWaySwitch => "two_way_switch",
            Self::BrewSwitch => "brew_switch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// Outputs addressable from the DEBUG `writepin` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPin {
    LevelProbeEnable,
    Buzzer,
    LedMain,
    LedHeater,
    LedWater,
    FillValve,
    PumpRelay,
    HeaterSsr,
    PumpTriac,
}

impl OutputPin {
    pub const ALL: [Self; 9] = [
        Self::LevelProbeEnable,
        Self::Buzzer,
        Self::LedMain,
        Self::LedHeater,
        Self::LedWater,
        Self::FillValve,
        Self::PumpRelay,
        Self::HeaterSsr,
        Self::PumpTriac,
    ];

    pub const fn gpio(self) -> i32 {
        match self {
            Self::LevelProbeEnable => ENABLE_LM1830_GPIO,
            Self::Buzzer => BUZZER_GPIO,
            Self::LedMain => LED_MAIN_GPIO,
            Self::LedHeater => LED_HEATER_GPIO,
            Self::LedWater => LED_WATER_GPIO,
            Self::FillValve => FILL_VALVE_GPIO,
            Self::PumpRelay => PUMP_RELAY_GPIO,
            Self::HeaterSsr => HEATER_SSR_GPIO,
            Self::PumpTriac => PUMP_TRIAC_GPIO,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::LevelProbeEnable => "enable_lm1830",
            Self::Buzzer => "buzzer",
            Self::LedMain => "ledmain",
            Self::LedHeater => "ledheater",
            Self::LedWater => "ledwater",
            Self::FillValve => "fill_valve",
            Self::PumpRelay => "pump_relay",
            Self::HeaterSsr => "heater_ssr",
            Self::PumpTriac => "pump_triac",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

/// ADS1115 single-ended channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcChannel {
    Boiler = 0,
    Hx = 1,
    Spare = 2,
    Pressure = 3,
}

impl AdcChannel {
    pub fn from_index(idx: u8) -> Option<Self> {
        match idx {
            0 => Some(Self::Boiler),
            1 => Some(Self::Hx),
            2 => Some(Self::Spare),
            3 => Some(Self::Pressure),
            _ => None,
        }
    }
}
