//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.  This is the classic embedded C FSM pattern
//! expressed in safe Rust.
//!
//! ```text
//!  INIT ──▶ HEATING ──[stable, coffee]──▶ IDLE ──[15 min]──▶ STANDBY
//!             │  ▲  └─[stable, steam]─▶ COOLING_FLUSH ─[4 s]─▶ │   │
//!             │  │                                             │   │
//!     [lever] │  └──────────[drift / setpoint change]──────────┘   │
//!             ▼                                                    │
//!          BREWING ──[lever down, boost]──▶ STEAM_BOOST ──[60 s]──▶ HEATING / IDLE
//!             └─────[lever down]──────────▶ HEATING / IDLE         │
//!                                                                  │
//!  STANDBY ──[lever lifted, then lowered]──▶ HEATING ◀─────────────┘
//!
//!  CLEANING_START ─[lever]─▶ CLEANING_PUMPING ─[lever down]─▶ CLEANING_PAUSE
//!                                   ▲                              │
//!                                   └──────────[lever]─────────────┘
//!                           (10 repetitions, then HEATING / IDLE)
//!
//!  Any state but DEBUG ──[sensor failure]──▶ ERROR ──[clear]──▶ HEATING
//!                      ──[tank empty]──▶ WATER_EMPTY ──[refill]──▶ HEATING / cleaning
//!                      ──[boiler empty]──▶ BOILER_EMPTY ──[full 200 ms]──▶ HEATING
//! ```

use super::context::{CleaningBeep, FsmContext, Indication};
use super::{StateDescriptor, StateId};
use crate::control::heater::STABILITY_TOLERANCE_C;
use log::{info, warn};

/// Pump run of the post-stability cooling flush.
pub const COOLING_FLUSH_MS: u64 = 4000;
/// IDLE without activity before STANDBY.
pub const STANDBY_TIMEOUT_MS: u64 = 15 * 60 * 1000;
/// Steam mode flushes the group this often while idle.
pub const PERIODIC_FLUSH_INTERVAL_MS: u64 = 5 * 60 * 1000;
/// IDLE ignores temperature drift this long after a cooling flush.
pub const POST_FLUSH_SETTLE_MS: u64 = 60_000;
pub const STEAM_BOOST_MS: u64 = 60_000;
/// Continuous "full" reading that ends a boiler fill.
pub const BOILER_FULL_CONFIRM_MS: u64 = 200;
/// HEATING → IDLE ready beep.
pub const READY_BEEP_MS: u64 = 150;

pub const TOTAL_CLEANING_REPETITIONS: u8 = 10;
/// Pump run per cleaning repetition before the cue sounds.
pub const CLEANING_PUMP_MS: u64 = 10_000;
pub const CLEANING_BEEP_MS: u64 = 150;
pub const CLEANING_BEEP_PAUSE_MS: u64 = 150;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: WaterEmpty
        StateDescriptor {
            id: StateId::WaterEmpty,
            name: "WATER_EMPTY",
            on_enter: Some(all_stop_enter),
            on_exit: None,
            on_update: water_empty_update,
        },
        // Index 1: BoilerEmpty
        StateDescriptor {
            id: StateId::BoilerEmpty,
            name: "BOILER_EMPTY",
            on_enter: Some(boiler_empty_enter),
            on_exit: Some(boiler_empty_exit),
            on_update: boiler_empty_update,
        },
        // Index 2: Heating
        StateDescriptor {
            id: StateId::Heating,
            name: "HEATING",
            on_enter: Some(heating_enter),
            on_exit: None,
            on_update: heating_update,
        },
        // Index 3: Brewing
        StateDescriptor {
            id: StateId::Brewing,
            name: "BREWING",
            on_enter: Some(brewing_enter),
            on_exit: None,
            on_update: brewing_update,
        },
        // Index 4: Standby
        StateDescriptor {
            id: StateId::Standby,
            name: "STANDBY",
            on_enter: Some(all_stop_enter),
            on_exit: Some(standby_exit),
            on_update: standby_update,
        },
        // Index 5: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "IDLE",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 6: CleaningStart
        StateDescriptor {
            id: StateId::CleaningStart,
            name: "CLEANING_START",
            on_enter: Some(pump_off_enter),
            on_exit: None,
            on_update: cleaning_start_update,
        },
        // Index 7: CleaningPumping
        StateDescriptor {
            id: StateId::CleaningPumping,
            name: "CLEANING_PUMPING",
            on_enter: Some(cleaning_pumping_enter),
            on_exit: None,
            on_update: cleaning_pumping_update,
        },
        // Index 8: CleaningPause
        StateDescriptor {
            id: StateId::CleaningPause,
            name: "CLEANING_PAUSE",
            on_enter: Some(pump_off_enter),
            on_exit: None,
            on_update: cleaning_pause_update,
        },
        // Index 9: SteamBoost
        StateDescriptor {
            id: StateId::SteamBoost,
            name: "STEAM_BOOST",
            on_enter: Some(steam_boost_enter),
            on_exit: None,
            on_update: steam_boost_update,
        },
        // Index 10: CoolingFlush
        StateDescriptor {
            id: StateId::CoolingFlush,
            name: "COOLING_FLUSH",
            on_enter: Some(cooling_flush_enter),
            on_exit: None,
            on_update: cooling_flush_update,
        },
        // Index 11: Error
        StateDescriptor {
            id: StateId::Error,
            name: "ERROR",
            on_enter: Some(error_enter),
            on_exit: None,
            on_update: error_update,
        },
        // Index 12: Debug
        StateDescriptor {
            id: StateId::Debug,
            name: "DEBUG",
            on_enter: Some(debug_enter),
            on_exit: Some(debug_exit),
            on_update: debug_update,
        },
        // Index 13: Init
        StateDescriptor {
            id: StateId::Init,
            name: "INIT",
            on_enter: None,
            on_exit: None,
            on_update: init_update,
        },
        // Index 14: CalibrationEmpty
        StateDescriptor {
            id: StateId::CalibrationEmpty,
            name: "CALIBRATION_EMPTY",
            on_enter: Some(calibration_enter),
            on_exit: None,
            on_update: calibration_update,
        },
        // Index 15: CalibrationTestWeight
        StateDescriptor {
            id: StateId::CalibrationTestWeight,
            name: "CALIBRATION_TEST_WEIGHT",
            on_enter: Some(calibration_enter),
            on_exit: None,
            on_update: calibration_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Supervisory checks and the shared transition hook
// ═══════════════════════════════════════════════════════════════════════════

/// Checks that override whatever the current state wants.  Sets
/// `ctx.preempted` so recovery paths wait for a clean tick.
pub fn preempt(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.preempted = false;
    if ctx.state == StateId::Debug {
        return None;
    }

    if ctx.has_faults() {
        ctx.preempted = true;
        return Some(StateId::Error);
    }

    if ctx.inputs.water_tripped {
        ctx.preempted = true;
        if ctx.state != StateId::WaterEmpty {
            ctx.cleaning.resume = if ctx.state.is_cleaning() {
                warn!("Water empty during cleaning, pausing cycle");
                Some(ctx.state)
            } else {
                None
            };
        }
        return Some(StateId::WaterEmpty);
    }

    if ctx.sensors.boiler_empty {
        // BOILER_EMPTY clears the flag itself once the fill completes.
        ctx.preempted = ctx.state != StateId::BoilerEmpty;
        return Some(StateId::BoilerEmpty);
    }
    None
}

/// Side effects that depend on both ends of a transition.  Runs before
/// the old state's `on_exit`.
pub fn on_transition(ctx: &mut FsmContext, from: StateId, to: StateId) {
    ctx.timers.last_transition_ms = Some(ctx.now_ms);
    ctx.silence();

    if from == StateId::Heating && to == StateId::Idle {
        ctx.beep(READY_BEEP_MS);
    }

    let resting = |s: StateId| matches!(s, StateId::Heating | StateId::Idle);
    if resting(from) && !resting(to) {
        ctx.heater.clear_stability();
    }

    ctx.previous_state = from;
    // A full list only loses events, never control.
    let _ = ctx.transitions.push((from, to));
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared entry actions
// ═══════════════════════════════════════════════════════════════════════════

fn all_stop_enter(ctx: &mut FsmContext) {
    ctx.all_stop();
}

fn pump_off_enter(ctx: &mut FsmContext) {
    ctx.pump_and_valve_off();
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT state
// ═══════════════════════════════════════════════════════════════════════════

fn init_update(_ctx: &mut FsmContext) -> Option<StateId> {
    Some(StateId::Heating)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR state
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut FsmContext) {
    ctx.all_stop();
    ctx.commands.indication = Indication::Error;
}

fn error_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.commands.indication = Indication::Error;
    if !ctx.has_faults() && !ctx.preempted {
        info!("Sensor failure cleared");
        ctx.silence();
        return Some(StateId::Heating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  WATER_EMPTY state
// ═══════════════════════════════════════════════════════════════════════════

fn water_empty_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.commands.indication = Indication::WaterEmpty;
    if ctx.preempted {
        return None;
    }
    ctx.silence();
    match ctx.cleaning.resume.take() {
        Some(state) => {
            info!("Water refilled, resuming cleaning cycle");
            Some(state)
        }
        None => Some(StateId::Heating),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  BOILER_EMPTY state
// ═══════════════════════════════════════════════════════════════════════════

fn boiler_empty_enter(ctx: &mut FsmContext) {
    ctx.commands.heater = false;
    ctx.commands.level_probe = true;
    ctx.commands.pump_power = 100.0;
    ctx.timers.boiler_full_since_ms = None;
}

fn boiler_empty_exit(ctx: &mut FsmContext) {
    ctx.commands.level_probe = false;
}

fn boiler_empty_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.inputs.lever_lifted {
        ctx.pump_and_valve_off();
        return None;
    }
    ctx.commands.fill_valve = true;
    ctx.commands.pump = true;

    if ctx.sensors.boiler_water_detected {
        let since = *ctx.timers.boiler_full_since_ms.get_or_insert(ctx.now_ms);
        if !ctx.preempted && ctx.elapsed_since(since) >= BOILER_FULL_CONFIRM_MS {
            info!("Boiler refilled");
            ctx.pump_and_valve_off();
            return Some(StateId::Heating);
        }
    } else {
        ctx.timers.boiler_full_since_ms = None;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEATING state
// ═══════════════════════════════════════════════════════════════════════════

fn heating_enter(ctx: &mut FsmContext) {
    ctx.heater.rearm();
}

/// Lever lift or programmatic flush, shared by HEATING and IDLE.
/// `Err` carries a transition, `Ok(true)` means the flush owns the pump.
fn lever_or_flush(ctx: &mut FsmContext) -> Result<bool, StateId> {
    if ctx.inputs.lever_lifted {
        if ctx.flush_until_ms.take().is_some() {
            info!("Programmatic flush cancelled by lever");
        }
        return Err(StateId::Brewing);
    }
    if ctx.flush_active() {
        ctx.commands.pump_power = 100.0;
        ctx.commands.fill_valve = false;
        ctx.commands.pump = true;
        return Ok(true);
    }
    ctx.pump_and_valve_off();
    Ok(false)
}

fn heating_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    ctx.commands.indication = Indication::Heating;

    match lever_or_flush(ctx) {
        Err(next) => return Some(next),
        Ok(true) => return None,
        Ok(false) => {}
    }

    let hx = ctx.sensors.hx_temp_c;
    if ctx.heater.is_stable(&ctx.config, hx, ctx.now_ms) {
        if ctx.coffee_mode() {
            info!("Temperature stable -> IDLE");
            return Some(StateId::Idle);
        }
        return Some(StateId::CoolingFlush);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COOLING_FLUSH state
// ═══════════════════════════════════════════════════════════════════════════

fn cooling_flush_enter(ctx: &mut FsmContext) {
    ctx.commands.fill_valve = false;
    ctx.commands.pump_power = 100.0;
    ctx.commands.pump = true;
    ctx.timers.flush_start_ms = ctx.now_ms;
}

fn cooling_flush_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    if ctx.elapsed_since(ctx.timers.flush_start_ms) >= COOLING_FLUSH_MS {
        ctx.pump_and_valve_off();
        ctx.timers.cooling_flush_end_ms = Some(ctx.now_ms);
        return Some(StateId::Idle);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    ctx.pump_and_valve_off();
    ctx.timers.idle_entry_ms = ctx.now_ms;
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    let rearmed = ctx.run_heater();
    ctx.commands.indication = Indication::Ready;
    if rearmed {
        return Some(StateId::Heating);
    }

    let coffee = ctx.coffee_mode();
    let pid = ctx.heater.pid();
    let drifted = (pid.input() - pid.setpoint()).abs() > STABILITY_TOLERANCE_C;
    let settled = ctx
        .timers
        .cooling_flush_end_ms
        .is_none_or(|end| ctx.elapsed_since(end) > POST_FLUSH_SETTLE_MS);
    if coffee && drifted && settled {
        info!("Temperature unstable, returning to HEATING");
        return Some(StateId::Heating);
    }

    match lever_or_flush(ctx) {
        Err(next) => return Some(next),
        Ok(true) => return None,
        Ok(false) => {}
    }

    let idle_for = ctx.elapsed_since(ctx.timers.idle_entry_ms);
    if idle_for >= STANDBY_TIMEOUT_MS {
        return Some(StateId::Standby);
    }
    if !coffee && idle_for >= PERIODIC_FLUSH_INTERVAL_MS {
        info!("Periodic flush triggered");
        return Some(StateId::CoolingFlush);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  BREWING state
// ═══════════════════════════════════════════════════════════════════════════

fn brewing_enter(ctx: &mut FsmContext) {
    ctx.commands.fill_valve = false;
    ctx.commands.pump = true;
    ctx.cursor.reset();
    ctx.timers.shot_start_ms = ctx.now_ms;
    ctx.pump.hold_manual();
}

fn brewing_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    ctx.commands.indication = Indication::Ready;
    ctx.run_pump_profile();

    if ctx.inputs.lever_lifted {
        return None;
    }
    if ctx.config.steam_boost {
        Some(StateId::SteamBoost)
    } else {
        Some(ctx.resting_state())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  STEAM_BOOST state
// ═══════════════════════════════════════════════════════════════════════════

fn steam_boost_enter(ctx: &mut FsmContext) {
    ctx.pump_and_valve_off();
    ctx.timers.steam_boost_entry_ms = ctx.now_ms;
}

fn steam_boost_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    if ctx.elapsed_since(ctx.timers.steam_boost_entry_ms) >= STEAM_BOOST_MS {
        return Some(ctx.resting_state());
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  STANDBY state
// ═══════════════════════════════════════════════════════════════════════════

fn standby_exit(ctx: &mut FsmContext) {
    ctx.standby_lever_lifted = false;
}

fn standby_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.commands.indication = Indication::Standby;
    if ctx.inputs.lever_lifted {
        ctx.standby_lever_lifted = true;
    }
    if ctx.standby_lever_lifted && !ctx.inputs.lever_lifted {
        info!("Waking from standby");
        return Some(StateId::Heating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLEANING states
// ═══════════════════════════════════════════════════════════════════════════

fn cleaning_start_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    ctx.commands.indication = Indication::Ready;
    if ctx.inputs.lever_lifted {
        info!("Cleaning cycle 1/{TOTAL_CLEANING_REPETITIONS}: lever lifted, starting pump");
        return Some(StateId::CleaningPumping);
    }
    None
}

fn cleaning_pumping_enter(ctx: &mut FsmContext) {
    ctx.commands.pump_power = 100.0;
    ctx.commands.pump = true;
    ctx.commands.fill_valve = false;
    ctx.cleaning.pump_start_ms = ctx.now_ms;
    ctx.cleaning.beep = CleaningBeep::Waiting;
}

/// End-of-run cue: one beep, or beep-pause-beep on the final repetition.
fn advance_cleaning_beep(ctx: &mut FsmContext) {
    let now = ctx.now_ms;
    let final_rep = ctx.cleaning.count + 1 == TOTAL_CLEANING_REPETITIONS;
    let pumped_ms = ctx.elapsed_since(ctx.cleaning.pump_start_ms);
    ctx.cleaning.beep = match ctx.cleaning.beep {
        CleaningBeep::Waiting if pumped_ms >= CLEANING_PUMP_MS => {
            ctx.commands.buzzer = true;
            CleaningBeep::First { since_ms: now }
        }
        CleaningBeep::First { since_ms } if now.saturating_sub(since_ms) >= CLEANING_BEEP_MS => {
            ctx.commands.buzzer = false;
            if final_rep {
                CleaningBeep::Pause { since_ms: now }
            } else {
                CleaningBeep::Done
            }
        }
        CleaningBeep::Pause { since_ms } if now.saturating_sub(since_ms) >= CLEANING_BEEP_PAUSE_MS => {
            ctx.commands.buzzer = true;
            CleaningBeep::Second { since_ms: now }
        }
        CleaningBeep::Second { since_ms } if now.saturating_sub(since_ms) >= CLEANING_BEEP_MS => {
            ctx.commands.buzzer = false;
            CleaningBeep::Done
        }
        other => other,
    };
}

fn cleaning_pumping_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    ctx.commands.indication = Indication::Ready;
    advance_cleaning_beep(ctx);

    if ctx.inputs.lever_lifted {
        return None;
    }
    ctx.commands.pump = false;
    ctx.silence();
    ctx.cleaning.count += 1;

    if ctx.cleaning.count >= TOTAL_CLEANING_REPETITIONS {
        info!("Cleaning cycle finished");
        ctx.cleaning.count = 0;
        ctx.cleaning.resume = None;
        return Some(ctx.resting_state());
    }
    info!(
        "Cleaning rep {} complete, pull lever for next",
        ctx.cleaning.count
    );
    Some(StateId::CleaningPause)
}

fn cleaning_pause_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    ctx.commands.indication = Indication::Ready;
    if ctx.inputs.lever_lifted {
        info!(
            "Cleaning cycle {}/{TOTAL_CLEANING_REPETITIONS}: lever lifted, starting pump",
            ctx.cleaning.count + 1
        );
        return Some(StateId::CleaningPumping);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CALIBRATION states
// ═══════════════════════════════════════════════════════════════════════════

fn calibration_enter(ctx: &mut FsmContext) {
    ctx.pump_and_valve_off();
    if ctx.state == StateId::CalibrationEmpty {
        info!("Calibration step 1: empty the scale, then send 'calibratenext'");
    } else {
        info!(
            "Calibration step 2: place the test weight, then send 'calibratenext <grams>'"
        );
    }
}

fn calibration_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.run_heater();
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEBUG state
// ═══════════════════════════════════════════════════════════════════════════

fn debug_enter(ctx: &mut FsmContext) {
    ctx.all_stop();
    ctx.commands.indication = Indication::Manual;
    warn!("DEBUG mode: automatic control suspended");
}

fn debug_exit(ctx: &mut FsmContext) {
    if ctx.heater.manual().is_some() {
        ctx.heater.set_manual(None);
        info!("Manual heater control disabled, loop back to automatic");
    }
}

fn debug_update(ctx: &mut FsmContext) -> Option<StateId> {
    ctx.commands.indication = Indication::Manual;
    if ctx.heater.manual().is_some() {
        ctx.run_heater();
    }
    None
}
