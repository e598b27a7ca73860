//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! A message-bus or screen-link publisher would implement the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events written since construction.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | {} {} | boiler={:.1}\u{00b0}C (target {:.1}) | HX={:.1}\u{00b0}C \
                     (set {:.1}) | {:.2}bar | {:.1}g {:.2}g/s | pump={} {:.0}% ->{:.1} | \
                     heater={} {:.0}% | lever={} | faults=0b{:04b}",
                    t.state,
                    t.brew_mode.as_str(),
                    t.boiler_temp_c,
                    t.computed_boiler_c,
                    t.hx_temp_c,
                    t.brew_setpoint_c,
                    t.pressure_bar,
                    t.weight_g,
                    t.flow_g_per_s,
                    if t.pump_on { "ON" } else { "OFF" },
                    t.pump_output_pct,
                    t.pump_target,
                    if t.heater_on { "ON" } else { "OFF" },
                    t.heater_output_pct,
                    if t.lever_lifted { "UP" } else { "DOWN" },
                    t.fault_flags,
                );
                log::debug!(
                    "PID | heater p={:.3} i={:.3} d={:.3} | pressure p={:.3} i={:.3} d={:.3} | \
                     flow p={:.3} i={:.3} d={:.3}",
                    t.heater_terms.p,
                    t.heater_terms.i,
                    t.heater_terms.d,
                    t.pressure_terms.p,
                    t.pressure_terms.i,
                    t.pressure_terms.d,
                    t.flow_terms.p,
                    t.flow_terms.i,
                    t.flow_terms.d,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            AppEvent::FaultDetected(flags) => {
                warn!("FAULT | detected, flags=0b{flags:04b}");
            }
            AppEvent::FaultCleared => {
                info!("FAULT | all cleared");
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={state}");
            }
            AppEvent::SettingChanged(key) => {
                info!("SETTING | {key} changed");
            }
            AppEvent::ScaleCalibrated { offset, factor } => {
                info!("SCALE | calibrated offset={offset} factor={factor:.4}");
            }
            AppEvent::RawData(r) => {
                info!(
                    "RAW | scale={} ({:.2}g raw, {:.2}g filtered, {:.2}g/s) | boiler={} hx={} press={}",
                    r.scale_raw,
                    r.raw_weight_g,
                    r.weight_g,
                    r.flow_g_per_s,
                    r.boiler_code,
                    r.hx_code,
                    r.pressure_code,
                );
            }
        }
    }
}
