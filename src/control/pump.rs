//! Pump drive during a shot: full power, or one of two mutually exclusive
//! closed loops (pressure or flow) tracking a flat or profiled target.
//!
//! Both loops drive the same phase-dimmer output, so the value handed from
//! one loop to the other on a source switch is the shared `output`.

use crate::config::{ProfilingMode, ProfilingSource, ProfilingTarget, SystemConfig};
use crate::control::pid::{Mode, PidController};
use crate::profile::ShotCursor;

pub const PUMP_SAMPLE_MS: u64 = 50;
pub const PUMP_OUTPUT_MIN: f32 = 50.0;
pub const PUMP_OUTPUT_MAX: f32 = 100.0;

/// Targets below this are treated as "stop the pump".
const STOP_TARGET: f32 = 0.1;
/// A zero target only stops the pump once pre-infusion had a chance.
const STOP_GRACE_MS: u64 = 5000;

/// Shot progress and measured channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShotProgress {
    pub elapsed_ms: u64,
    pub weight_g: f32,
    pub pressure_bar: f32,
    pub flow_g_per_s: f32,
}

/// What the pump should do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpDemand {
    /// `false` switches the pump relay off.
    pub run: bool,
    pub power_pct: f32,
}

#[derive(Debug, Clone)]
pub struct PumpController {
    pressure: PidController,
    flow: PidController,
    output: f32,
    target: f32,
}

impl PumpController {
    pub fn new(cfg: &SystemConfig) -> Self {
        let mut pressure = PidController::new(
            cfg.pressure_gains,
            PUMP_SAMPLE_MS,
            PUMP_OUTPUT_MIN,
            PUMP_OUTPUT_MAX,
        );
        let mut flow =
            PidController::new(cfg.flow_gains, PUMP_SAMPLE_MS, PUMP_OUTPUT_MIN, PUMP_OUTPUT_MAX);
        pressure.set_mode(Mode::Manual);
        flow.set_mode(Mode::Manual);
        Self {
            pressure,
            flow,
            output: 0.0,
            target: 0.0,
        }
    }

    /// Apply changed gains from configuration.
    pub fn retune(&mut self, cfg: &SystemConfig) {
        self.pressure.retune_if_changed(cfg.pressure_gains);
        self.flow.retune_if_changed(cfg.flow_gains);
    }

    /// Park both loops.
    pub fn hold_manual(&mut self) {
        self.pressure.set_mode(Mode::Manual);
        self.flow.set_mode(Mode::Manual);
    }

    /// Park both loops with a zero output.
    pub fn stop(&mut self) {
        self.hold_manual();
        self.output = 0.0;
        self.pressure.set_output(0.0);
        self.flow.set_output(0.0);
    }

    pub fn run(
        &mut self,
        cfg: &SystemConfig,
        cursor: &mut ShotCursor,
        progress: ShotProgress,
        now_ms: u64,
    ) -> PumpDemand {
        let full = PumpDemand {
            run: true,
            power_pct: 100.0,
        };

        let target = match cfg.profiling_mode {
            ProfilingMode::Manual => {
                self.hold_manual();
                return full;
            }
            ProfilingMode::Flat => cfg.profiling_flat_value,
            ProfilingMode::Profile => {
                let x = match cfg.profiling_target {
                    ProfilingTarget::Time => progress.elapsed_ms as f32 / 1000.0,
                    ProfilingTarget::Weight => progress.weight_g.max(0.0),
                };
                cfg.profile.target_at(cursor, x)
            }
        };
        self.target = target;

        if target < STOP_TARGET && progress.elapsed_ms > STOP_GRACE_MS {
            self.stop();
            return PumpDemand {
                run: false,
                power_pct: 0.0,
            };
        }

        let (active, idle, input) = match cfg.profiling_source {
            Some(ProfilingSource::Pressure) => {
                (&mut self.pressure, &mut self.flow, progress.pressure_bar)
            }
            Some(ProfilingSource::Flow) => {
                (&mut self.flow, &mut self.pressure, progress.flow_g_per_s)
            }
            None => {
                self.hold_manual();
                return full;
            }
        };

        idle.set_mode(Mode::Manual);
        if active.mode() == Mode::Manual {
            // Take over from the shared output.
            active.set_output(self.output);
            active.set_mode(Mode::Automatic);
        }
        active.set_setpoint(target);
        if let Some(out) = active.compute(input, now_ms) {
            self.output = out;
        }

        PumpDemand {
            run: true,
            power_pct: self.output,
        }
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn pressure_loop(&self) -> &PidController {
        &self.pressure
    }

    pub fn flow_loop(&self) -> &PidController {
        &self.flow
    }
}
