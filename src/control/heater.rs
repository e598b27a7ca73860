//! Boiler heater control: feed-forward heat-loss model, PID trim and a
//! slow time-proportioning PWM on the solid-state relay.
//!
//! ```text
//!  setpoint ─▶ feed-forward(setpoint) ─┐
//!                                      ├─▶ clamp 0..100 % ─▶ SlowPwm (5 s) ─▶ SSR
//!  HX temp  ─▶ PID(setpoint) ──────────┘
//! ```
//!
//! The boiler is hotter than the HX at steady state.  Inverting the boiler
//! loss model at the feed-forward power gives the boiler temperature that
//! corresponds to the brew setpoint; the margins above it decide when the
//! PID is bypassed or the heater forced off.

use log::{debug, info};

use crate::config::{BrewMode, PidGains, SystemConfig};
use crate::control::pid::{Mode, PidController};

/// Room temperature assumed by the loss model (°C).
pub const ASSUMED_AMBIENT_C: f64 = 20.0;

/// Loss coefficients fitted at the HX (brew water path).
pub const BREW_LOSS: HeatLossModel = HeatLossModel::new(0.000_363, 5.623e-12);

/// Loss coefficients fitted at the boiler shell.
pub const BOILER_LOSS: HeatLossModel = HeatLossModel::new(0.000_041, 4.984e-12);

/// Heater is never energised at or above this boiler temperature.
pub const MAX_ALLOWED_BOILER_C: f32 = 133.0;

/// Time-proportioning window.
pub const PWM_WINDOW_MS: u64 = 5000;

pub const HEATER_SAMPLE_MS: u64 = 1000;
pub const HEATER_OUTPUT_MIN: f32 = -100.0;
pub const HEATER_OUTPUT_MAX: f32 = 100.0;

/// Below this HX deficit the loop is bypassed and the heater runs flat out.
pub const FAR_BELOW_SETPOINT_C: f32 = 20.0;

pub const STABILITY_TOLERANCE_C: f32 = 0.2;
pub const STABILITY_HOLD_MS: u64 = 120_000;

const NEWTON_MAX_ITERATIONS: usize = 20;
const NEWTON_TOLERANCE: f64 = 0.01;
const KELVIN_OFFSET: f64 = 273.15;

// ---------------------------------------------------------------------------
// Heat-loss model
// ---------------------------------------------------------------------------

/// Steady-state loss `c1·ΔT + c2·(T⁴ − Tₐ⁴)` scaled to heater percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatLossModel {
    pub c1: f64,
    pub c2: f64,
}

impl HeatLossModel {
    pub const fn new(c1: f64, c2: f64) -> Self {
        Self { c1, c2 }
    }

    /// Heater percentage needed to hold `temp_c` against `ambient_c`.
    pub fn power(&self, temp_c: f64, ambient_c: f64) -> f64 {
        let t_k = temp_c + KELVIN_OFFSET;
        let a_k = ambient_c + KELVIN_OFFSET;
        let linear = self.c1 * (temp_c - ambient_c);
        let radiative = self.c2 * (t_k.powi(4) - a_k.powi(4));
        (linear + radiative) * 100.0
    }

    /// Newton-Raphson inverse of [`power`](Self::power).  Returns the last
    /// iterate if the residual never falls under the tolerance.
    pub fn temp_for_power(&self, target_power: f64, ambient_c: f64) -> f64 {
        if target_power <= 0.0 {
            return ambient_c;
        }

        let mut t = 100.0;
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let residual = self.power(t, ambient_c) - target_power;
            if residual.abs() < NEWTON_TOLERANCE {
                return t;
            }
            let t_k = t + KELVIN_OFFSET;
            let slope = 100.0 * (self.c1 + 4.0 * self.c2 * t_k.powi(3));
            if slope == 0.0 {
                break;
            }
            t -= residual / slope;
        }
        t
    }
}

/// Feed-forward heater percentage for an HX setpoint.
pub fn feed_forward(setpoint_c: f32) -> f32 {
    BREW_LOSS.power(f64::from(setpoint_c), ASSUMED_AMBIENT_C) as f32
}

/// Boiler temperature implied by holding the HX at `brew_c`.
pub fn computed_boiler_temp(brew_c: f32) -> f32 {
    let power = BREW_LOSS.power(f64::from(brew_c), ASSUMED_AMBIENT_C);
    BOILER_LOSS.temp_for_power(power, ASSUMED_AMBIENT_C) as f32
}

// ---------------------------------------------------------------------------
// Slow PWM
// ---------------------------------------------------------------------------

/// Time-proportioning output: on for the first `duty · window` of each window.
#[derive(Debug, Clone, Default)]
pub struct SlowPwm {
    window_start_ms: u64,
}

impl SlowPwm {
    pub fn new(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
        }
    }

    pub fn output(&mut self, duty_pct: f32, now_ms: u64) -> bool {
        let on_time = (duty_pct.clamp(0.0, 100.0) / 100.0 * PWM_WINDOW_MS as f32) as u64;
        if now_ms.saturating_sub(self.window_start_ms) >= PWM_WINDOW_MS {
            self.window_start_ms = now_ms;
        }
        on_time > now_ms - self.window_start_ms
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// What the active machine state wants from the heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterRole {
    /// Closed-loop regulation on the HX (coffee) or flat out (steam).
    Regulate,
    /// Flat out: brewing and steam boost draw more than any loop can add.
    /// The loop is not computed, so its integrator holds through the shot.
    FullPower,
    Off,
}

/// Per-tick inputs to [`HeaterController::run`].
#[derive(Debug, Clone, Copy)]
pub struct HeaterInputs {
    pub role: HeaterRole,
    pub boiler_c: f32,
    pub hx_c: f32,
    /// The machine is in HEATING (steam ceiling does not apply).
    pub heating: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaterDecision {
    pub heater_on: bool,
    /// The coffee setpoint moved and the loop was re-armed.
    pub setpoint_changed: bool,
}

#[derive(Debug, Clone)]
pub struct HeaterController {
    pid: PidController,
    pwm: SlowPwm,
    last_setpoint: f32,
    stable_since: Option<u64>,
    computed_for_c: f32,
    computed_boiler_c: f32,
    output_pct: f32,
    manual_pct: Option<f32>,
}

impl HeaterController {
    pub fn new(gains: PidGains, brew_temp_c: f32, now_ms: u64) -> Self {
        let mut pid =
            PidController::new(gains, HEATER_SAMPLE_MS, HEATER_OUTPUT_MIN, HEATER_OUTPUT_MAX);
        pid.set_mode(Mode::Automatic);
        Self {
            pid,
            pwm: SlowPwm::new(now_ms),
            last_setpoint: 0.0,
            stable_since: None,
            computed_for_c: brew_temp_c,
            computed_boiler_c: computed_boiler_temp(brew_temp_c),
            output_pct: 0.0,
            manual_pct: None,
        }
    }

    /// Boiler temperature target derived from the brew setpoint, cached.
    pub fn computed_boiler_c(&mut self, brew_temp_c: f32) -> f32 {
        if brew_temp_c != self.computed_for_c {
            self.computed_for_c = brew_temp_c;
            self.computed_boiler_c = computed_boiler_temp(brew_temp_c);
        }
        self.computed_boiler_c
    }

    pub fn run(&mut self, cfg: &SystemConfig, inputs: HeaterInputs, now_ms: u64) -> HeaterDecision {
        if let Some(pct) = self.manual_pct {
            self.output_pct = pct;
            return HeaterDecision {
                heater_on: self.pwm.output(pct, now_ms),
                setpoint_changed: false,
            };
        }

        self.pid.retune_if_changed(cfg.heater_gains);

        let coffee = cfg.brew_mode == BrewMode::Coffee;
        let mut should_run = true;
        let mut bypass = false;
        match inputs.role {
            HeaterRole::Regulate if coffee => {
                self.pid.set_setpoint(cfg.brew_temp_c);
                // Input is recorded even when the loop is bypassed.
                self.pid.set_input(inputs.hx_c);
                if inputs.boiler_c < cfg.brew_temp_c
                    || inputs.hx_c + FAR_BELOW_SETPOINT_C < cfg.brew_temp_c
                {
                    bypass = true;
                }
            }
            HeaterRole::Regulate | HeaterRole::FullPower => bypass = true,
            HeaterRole::Off => should_run = false,
        }

        let mut decision = HeaterDecision::default();
        if coffee && self.pid.setpoint() != self.last_setpoint {
            info!(
                "Heater loop re-armed: setpoint {:.1} -> {:.1} C",
                self.last_setpoint,
                self.pid.setpoint()
            );
            self.pid.reinitialize();
            self.last_setpoint = self.pid.setpoint();
            decision.setpoint_changed = true;
        }

        if !coffee
            && !inputs.heating
            && inputs.boiler_c >= cfg.brew_temp_c + cfg.steam_ceiling_offset_c
        {
            should_run = false;
        }
        if inputs.boiler_c >= MAX_ALLOWED_BOILER_C {
            should_run = false;
        }

        if !should_run {
            self.output_pct = 0.0;
            return decision;
        }
        if bypass {
            self.output_pct = 100.0;
            decision.heater_on = true;
            return decision;
        }

        let setpoint = self.pid.setpoint();
        let ff = feed_forward(setpoint);
        let computed = self.computed_boiler_c(cfg.brew_temp_c);
        let too_hot =
            inputs.boiler_c > computed + cfg.ff_only_margin_c && inputs.hx_c < cfg.brew_temp_c;
        let way_too_hot = inputs.boiler_c >= computed + cfg.way_too_hot_margin_c;

        let total = if coffee && way_too_hot {
            0.0
        } else if coffee && too_hot {
            ff
        } else {
            if let Some(out) = self.pid.compute(inputs.hx_c, now_ms) {
                let t = self.pid.terms();
                debug!("Heater PID out={out:.3} p={:.3} i={:.3} d={:.3}", t.p, t.i, t.d);
            }
            ff + self.pid.output()
        };

        self.output_pct = total.clamp(0.0, 100.0);
        decision.heater_on = self.pwm.output(self.output_pct, now_ms);
        decision
    }

    /// Coffee: HX within tolerance of the setpoint for the hold time.
    /// Steam: HX at or above the brew setpoint.
    pub fn is_stable(&mut self, cfg: &SystemConfig, hx_c: f32, now_ms: u64) -> bool {
        if cfg.brew_mode == BrewMode::Steam {
            if hx_c >= cfg.brew_temp_c {
                return true;
            }
            self.stable_since = None;
            return false;
        }

        if (self.pid.input() - self.pid.setpoint()).abs() <= STABILITY_TOLERANCE_C {
            let since = *self.stable_since.get_or_insert(now_ms);
            now_ms.saturating_sub(since) >= STABILITY_HOLD_MS
        } else {
            self.stable_since = None;
            false
        }
    }

    /// Fresh start on entering HEATING: loop re-initialised and the
    /// stability timer dropped.  A DEBUG manual duty keeps the loop parked.
    pub fn rearm(&mut self) {
        if self.manual_pct.is_none() {
            self.pid.reinitialize();
        }
        self.stable_since = None;
    }

    pub fn clear_stability(&mut self) {
        self.stable_since = None;
    }

    pub fn stable_since(&self) -> Option<u64> {
        self.stable_since
    }

    /// DEBUG manual duty.  `None` returns control to the loop.
    pub fn set_manual(&mut self, pct: Option<f32>) {
        match pct {
            Some(p) => {
                self.manual_pct = Some(p.clamp(0.0, 100.0));
                self.pid.set_mode(Mode::Manual);
            }
            None => {
                self.manual_pct = None;
                self.pid.set_mode(Mode::Automatic);
            }
        }
    }

    pub fn manual(&self) -> Option<f32> {
        self.manual_pct
    }

    pub fn output_pct(&self) -> f32 {
        self.output_pct
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }
}
