//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (ADCs, GPIO, load cell, clock, event sinks, storage)
//! implement these traits.  The [`AppService`](super::service::AppService)
//! consumes them via generics, so the domain core never touches hardware
//! directly and runs unchanged against the mocks in `tests/`.

use crate::config::SystemConfig;
use crate::error::SensorError;
use crate::pins::{AdcChannel, InputPin, OutputPin};
use crate::sensors::scale_isr::DataReady;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Raw read side.  Conversion and filtering happen in the domain.
pub trait SensorPort {
    /// Single-shot ADS1115 conversion, signed 16-bit code.
    fn read_adc(&mut self, channel: AdcChannel) -> i32;

    /// Electrical level of a digital input (`true` = HIGH).
    fn read_pin(&mut self, pin: InputPin) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Front-panel indicator LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Main,
    Heater,
    Water,
}

/// Write-side port: the domain calls this to command actuators.
pub trait ActuatorPort {
    /// Heater solid-state relay.
    fn set_heater(&mut self, on: bool);

    /// Pump relay.
    fn set_pump(&mut self, on: bool);

    /// Pump phase-dimmer level (0–100 %).
    fn set_pump_power(&mut self, percent: f32);

    /// Boiler fill solenoid.
    fn set_fill_valve(&mut self, open: bool);

    /// LM1830 level-probe enable.
    fn set_level_probe(&mut self, enabled: bool);

    fn set_buzzer(&mut self, on: bool);

    fn set_led(&mut self, led: Led, on: bool);

    /// Raw output poke (DEBUG only).
    fn write_pin(&mut self, pin: OutputPin, high: bool);

    /// Kill heater, pump and valve: safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Scale port (ADS1232 load-cell converter)
// ───────────────────────────────────────────────────────────────

/// Result of clocking one conversion out of the load-cell ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleCode {
    /// Sign-extended 24-bit conversion.
    Value(i32),
    /// Positive full-scale sentinel (`0x7FFFFF`).
    FullScale,
    /// DOUT was still high; nothing to read.
    NotReady,
}

impl ScaleCode {
    pub fn value(self) -> Result<i32, SensorError> {
        match self {
            Self::Value(v) => Ok(v),
            Self::FullScale => Err(SensorError::FullScale),
            Self::NotReady => Err(SensorError::NotReady),
        }
    }
}

pub trait ScalePort {
    /// Flag raised by the data-ready interrupt.
    fn data_ready(&self) -> &DataReady;

    /// DOUT low: a conversion is waiting.  Polled by blocking reads.
    fn conversion_available(&mut self) -> bool;

    /// Clock out one conversion.
    fn read_conversion(&mut self) -> ScaleCode;

    /// Re-send gain / speed / channel to the control expander.
    fn configure(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Monotonic milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Busy-wait.  Only used by bounded maintenance routines.
    fn delay_ms(&mut self, ms: u32);
}

/// Everything the tick needs from the board, as one bound.
pub trait MachineIo: SensorPort + ActuatorPort + ScalePort + ClockPort {}

impl<T: SensorPort + ActuatorPort + ScalePort + ClockPort> MachineIo for T {}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, message
/// bus, screen link).  Delivery is never assumed.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
