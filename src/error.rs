//! Unified error types for the espresso controller core.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level tick and command handling uniform.  All variants are `Copy`
//! so they can be passed through the safety supervisor and FSM without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned out-of-range data.
    Sensor(SensorError),
    /// A critical sensor condition was detected.
    Safety(SafetyFault),
    /// An operator command or setting was rejected.
    Command(CommandError),
    /// The scale calibration wizard refused a step.
    Calibration(CalibrationError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC code pinned near a rail (open or shorted sensor).
    Railed,
    /// A bounded wait for data-ready ran out of attempts.
    Timeout,
    /// Load-cell converter returned its full-scale sentinel.
    FullScale,
    /// Load-cell converter had no conversion available.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Railed => write!(f, "ADC reading railed"),
            Self::Timeout => write!(f, "timed out waiting for data"),
            Self::FullScale => write!(f, "converter at full scale"),
            Self::NotReady => write!(f, "conversion not ready"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Critical sensor failures.  Any one of them sends the machine to ERROR
/// with every actuator off.  The supervisor tracks them as a bitmask so
/// several simultaneous failures are reported together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// Boiler thermistor ADC code outside the usable band.
    BoilerSensorRailed = 0b0000_0001,
    /// Heat-exchanger thermistor ADC code outside the usable band.
    HxSensorRailed = 0b0000_0010,
    /// Level-probe IC output high while the probe is disabled.
    LevelProbeStuckHigh = 0b0000_0100,
    /// Boiler above the absolute safety ceiling.
    BoilerOverTemp = 0b0000_1000,
}

impl SafetyFault {
    /// Evaluation order; the first active fault becomes `last_error`.
    pub const ALL: [Self; 4] = [
        Self::BoilerSensorRailed,
        Self::HxSensorRailed,
        Self::LevelProbeStuckHigh,
        Self::BoilerOverTemp,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoilerSensorRailed => write!(f, "boiler temperature sensor error"),
            Self::HxSensorRailed => write!(f, "HX temperature sensor error"),
            Self::LevelProbeStuckHigh => write!(f, "level probe output high while disabled"),
            Self::BoilerOverTemp => write!(f, "boiler temperature too high"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Operator-input errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Setting line had no `=`.
    MissingSeparator,
    /// Setting key is not recognised.
    UnknownKey,
    /// Command word is not recognised.
    UnknownCommand,
    /// A required argument was absent.
    MissingArgument(&'static str),
    /// An argument failed to parse or is out of range.
    InvalidValue(&'static str),
    /// Not allowed in the current machine state.
    WrongState(&'static str),
    /// Refused because the brew lever is lifted.
    LeverLifted,
    /// Only available in DEBUG.
    DebugOnly,
    /// Profile JSON could not be parsed.
    Json,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "expected key=value"),
            Self::UnknownKey => write!(f, "unknown setting"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::MissingArgument(what) => write!(f, "missing argument: {what}"),
            Self::InvalidValue(what) => write!(f, "invalid value: {what}"),
            Self::WrongState(what) => write!(f, "not allowed now: {what}"),
            Self::LeverLifted => write!(f, "brew lever is lifted"),
            Self::DebugOnly => write!(f, "only available in DEBUG"),
            Self::Json => write!(f, "JSON error"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// Calibration can only start from DEBUG, IDLE or HEATING.
    NotAllowed,
    /// No calibration step is pending.
    NotCalibrating,
    /// The declared test weight must be positive.
    InvalidWeight,
    /// Averaging ran out of read attempts.
    Timeout,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllowed => write!(f, "calibration not allowed in this state"),
            Self::NotCalibrating => write!(f, "not in a calibration step"),
            Self::InvalidWeight => write!(f, "test weight must be > 0"),
            Self::Timeout => write!(f, "scale read timed out"),
        }
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

impl From<SensorError> for CalibrationError {
    fn from(_: SensorError) -> Self {
        Self::Timeout
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
