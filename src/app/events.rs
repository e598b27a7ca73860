//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish on the
//! message bus, forward to the screen link.

use crate::config::BrewMode;
use crate::control::pid::PidTerms;
use crate::fsm::StateId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Periodic telemetry snapshot (1 Hz, or on request).
    Telemetry(TelemetryData),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// One or more safety faults were raised.
    FaultDetected(u8),

    /// All safety faults have been cleared.
    FaultCleared,

    /// The application service has started (carries initial state).
    Started(StateId),

    /// A persisted setting changed.
    SettingChanged(&'static str),

    /// The scale wizard finished and stored a new calibration.
    ScaleCalibrated { offset: i32, factor: f32 },

    /// Raw converter codes, streamed while `rawdata on` is active.
    RawData(RawReadings),
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryData {
    pub state: StateId,
    pub brew_mode: BrewMode,
    pub boiler_temp_c: f32,
    pub hx_temp_c: f32,
    /// Active brew setpoint.
    pub brew_setpoint_c: f32,
    /// Boiler temperature that holds the HX at the brew setpoint.
    pub computed_boiler_c: f32,
    pub pressure_bar: f32,
    pub weight_g: f32,
    pub flow_g_per_s: f32,
    pub pump_on: bool,
    /// Dimmer level currently requested (0–100 %).
    pub pump_output_pct: f32,
    /// Pressure or flow target of the active pump loop.
    pub pump_target: f32,
    pub heater_on: bool,
    pub heater_output_pct: f32,
    pub lever_lifted: bool,
    pub heater_terms: PidTerms,
    pub pressure_terms: PidTerms,
    pub flow_terms: PidTerms,
    pub fault_flags: u8,
}

/// Unfiltered converter output for scale and probe tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawReadings {
    pub scale_raw: i32,
    pub raw_weight_g: f32,
    pub weight_g: f32,
    pub flow_g_per_s: f32,
    pub boiler_code: i32,
    pub hx_code: i32,
    pub pressure_code: i32,
}
