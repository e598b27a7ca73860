//! System configuration parameters
//!
//! Every persisted setting of the controller.  Loaded from NVS at boot,
//! written back (debounced) whenever a setting changes.  Values that are
//! normally governed by a physical switch carry an `*_override` flag; while
//! it is clear the switch wins on every boot.

use serde::{Deserialize, Serialize};

use crate::profile::EspressoProfile;
use crate::sensors::kalman::KalmanParams;

/// Absolute ceiling for any configured boiler temperature (°C).
pub const MAX_CONFIGURABLE_TEMP_C: f32 = 150.0;

pub const DEFAULT_MQTT_PORT: u16 = 1883;

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Coffee keeps the HX at the brew setpoint; steam runs the boiler hot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrewMode {
    Coffee,
    Steam,
}

impl BrewMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coffee => "COFFEE",
            Self::Steam => "STEAM",
        }
    }

    pub fn is_coffee(self) -> bool {
        self == Self::Coffee
    }
}

/// How the pump is driven during a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfilingMode {
    /// Fixed full power, no closed loop.
    Manual,
    /// Closed loop on a constant target.
    Flat,
    /// Closed loop on the active profile curve.
    Profile,
}

impl ProfilingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "flat" => Some(Self::Flat),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Flat => "flat",
            Self::Profile => "profile",
        }
    }
}

/// Sensor channel the pump loop regulates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfilingSource {
    Pressure,
    Flow,
}

impl ProfilingSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pressure" => Some(Self::Pressure),
            "flow" => Some(Self::Flow),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pressure => "pressure",
            Self::Flow => "flow",
        }
    }
}

/// Progress axis of a profile: elapsed seconds or grams in the cup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfilingTarget {
    Time,
    Weight,
}

impl ProfilingTarget {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Some(Self::Time),
            "weight" => Some(Self::Weight),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Weight => "weight",
        }
    }
}

/// Proportional / integral / derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }

    fn is_finite(&self) -> bool {
        self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()
    }
}

// ---------------------------------------------------------------------------
// SystemConfig
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Message-bus connection ---
    pub mqtt_server: heapless::String<64>,
    pub mqtt_port: u16,
    pub mqtt_user: heapless::String<32>,
    pub mqtt_password: heapless::String<64>,

    // --- Temperatures (°C) ---
    /// HX target while brewing coffee.
    pub brew_temp_c: f32,
    /// Set once `brew_temp_c` was chosen remotely; the three-way switch is
    /// ignored while it holds.
    pub brew_temp_override: bool,
    pub steam_temp_c: f32,
    pub steam_boost_temp_c: f32,
    /// Steam mode stops heating at `brew_temp_c + steam_ceiling_offset_c`
    /// outside HEATING.
    pub steam_ceiling_offset_c: f32,
    /// Feed-forward only above `computed boiler + ff_only_margin_c`.
    pub ff_only_margin_c: f32,
    /// Heater forced off at `computed boiler + way_too_hot_margin_c`.
    pub way_too_hot_margin_c: f32,

    // --- Control loops ---
    pub heater_gains: PidGains,
    pub pressure_gains: PidGains,
    pub flow_gains: PidGains,

    // --- Scale ---
    pub weight_kalman: KalmanParams,
    pub flow_kalman: KalmanParams,
    pub scale_offset: i32,
    pub scale_factor: f32,

    // --- Mode ---
    /// Set once the brew mode was chosen remotely; the two-way switch is
    /// ignored while it holds.
    pub brew_mode_override: bool,
    pub brew_mode: BrewMode,
    pub steam_boost: bool,

    // --- Profiling ---
    pub profile: EspressoProfile,
    pub profiling_mode: ProfilingMode,
    /// `None` runs the pump at full power even in a closed-loop mode.
    pub profiling_source: Option<ProfilingSource>,
    pub profiling_target: ProfilingTarget,
    pub profiling_flat_value: f32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            mqtt_server: heapless::String::new(),
            mqtt_port: DEFAULT_MQTT_PORT,
            mqtt_user: heapless::String::new(),
            mqtt_password: heapless::String::new(),

            brew_temp_c: 94.0,
            brew_temp_override: false,
            steam_temp_c: 136.0,
            steam_boost_temp_c: 124.0,
            steam_ceiling_offset_c: 28.0,
            ff_only_margin_c: 4.0,
            way_too_hot_margin_c: 10.0,

            heater_gains: PidGains::new(0.169, 0.000_022_16, 0.0),
            pressure_gains: PidGains::new(0.05, 22.0, 0.0),
            flow_gains: PidGains::new(1.0, 0.5, 0.0),

            weight_kalman: KalmanParams::new(8.0, 2.0, 0.1),
            flow_kalman: KalmanParams::new(30.0, 2.0, 0.1),
            scale_offset: 0,
            scale_factor: 1.0,

            brew_mode_override: false,
            brew_mode: BrewMode::Coffee,
            steam_boost: true,

            profile: EspressoProfile::default(),
            profiling_mode: ProfilingMode::Manual,
            profiling_source: Some(ProfilingSource::Pressure),
            profiling_target: ProfilingTarget::Time,
            profiling_flat_value: 100.0,
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Returns the first offending field.
    pub fn validate(&self) -> Result<(), &'static str> {
        for (t, name) in [
            (self.brew_temp_c, "brew_temp_c out of range"),
            (self.steam_temp_c, "steam_temp_c out of range"),
            (self.steam_boost_temp_c, "steam_boost_temp_c out of range"),
        ] {
            if !t.is_finite() || t <= 0.0 || t > MAX_CONFIGURABLE_TEMP_C {
                return Err(name);
            }
        }
        if !self.steam_ceiling_offset_c.is_finite() || self.steam_ceiling_offset_c < 0.0 {
            return Err("steam_ceiling_offset_c must be >= 0");
        }
        if !self.ff_only_margin_c.is_finite() || self.ff_only_margin_c < 0.0 {
            return Err("ff_only_margin_c must be >= 0");
        }
        if !self.way_too_hot_margin_c.is_finite()
            || self.way_too_hot_margin_c < self.ff_only_margin_c
        {
            return Err("way_too_hot_margin_c must be >= ff_only_margin_c");
        }
        if !self.heater_gains.is_finite()
            || !self.pressure_gains.is_finite()
            || !self.flow_gains.is_finite()
        {
            return Err("PID gains must be finite");
        }
        for k in [self.weight_kalman, self.flow_kalman] {
            if !(k.measurement_error > 0.0 && k.estimate_error > 0.0)
                || !k.process_noise.is_finite()
                || k.process_noise < 0.0
            {
                return Err("Kalman errors must be > 0 and noise >= 0");
            }
        }
        if !self.scale_factor.is_finite() || self.scale_factor == 0.0 {
            return Err("scale_factor must be non-zero");
        }
        if !self.profiling_flat_value.is_finite() || self.profiling_flat_value < 0.0 {
            return Err("profiling_flat_value must be >= 0");
        }
        if self
            .profile
            .steps
            .iter()
            .any(|s| !s.trigger.is_finite() || !s.setpoint.is_finite() || s.trigger < 0.0)
        {
            return Err("profile steps must be finite with trigger >= 0");
        }
        Ok(())
    }

    /// Brew temperature selected by the three-way switch.
    pub fn switch_brew_temp(switch1_high: bool, switch2_high: bool) -> f32 {
        if switch1_high {
            90.0
        } else if switch2_high {
            94.0
        } else {
            92.0
        }
    }
}
