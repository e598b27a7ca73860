//! Brew, steam, flush and cleaning cycles driven through the tick.

use crate::mock_hw::{MockMachine, RecordingSink, boot_to_heating, run_for, run_until};

use espresso_core::app::service::AppService;
use espresso_core::config::BrewMode;
use espresso_core::fsm::StateId;
use espresso_core::pins::InputPin;

/// Longer than the lever debounce.
const SETTLE_MS: u64 = 200;

/// Hold the lever for `ms`, sampling the buzzer each tick.  Returns the
/// number of separate beeps heard.
fn hold_lever_counting_beeps(
    app: &mut AppService,
    hw: &mut MockMachine,
    sink: &mut RecordingSink,
    ms: u64,
) -> u32 {
    hw.lift_lever();
    let mut beeps = 0;
    let mut was_on = hw.buzzer;
    for _ in 0..ms / 10 {
        run_for(app, hw, sink, 10);
        if hw.buzzer && !was_on {
            beeps += 1;
        }
        was_on = hw.buzzer;
    }
    beeps
}

// ── Coffee ────────────────────────────────────────────────────

#[test]
fn lever_pull_from_heating_brews_and_returns() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    hw.lift_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Brewing, SETTLE_MS));
    run_for(&mut app, &mut hw, &mut sink, 1000);
    assert!(hw.pump);
    assert_eq!(hw.pump_power, 100.0);
    assert!(hw.heater);
    assert!(!hw.fill_valve);

    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, SETTLE_MS));
    assert!(!hw.pump);
    assert!(sink.saw_transition(StateId::Brewing, StateId::Heating));
}

#[test]
fn stable_temperature_reaches_idle_with_a_ready_beep() {
    let mut hw = MockMachine::new();
    hw.set_hx_c(92.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    let mut beeped = false;
    for _ in 0..13_000 {
        run_for(&mut app, &mut hw, &mut sink, 10);
        beeped |= hw.buzzer;
        if app.state() == StateId::Idle {
            break;
        }
    }
    assert_eq!(app.state(), StateId::Idle);
    run_for(&mut app, &mut hw, &mut sink, 50);
    beeped |= hw.buzzer;
    assert!(beeped);
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert!(!hw.buzzer);

    // Brewing from IDLE.
    hw.lift_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Brewing, SETTLE_MS));
    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, SETTLE_MS));
}

#[test]
fn temperature_drift_in_idle_goes_back_to_heating() {
    let mut hw = MockMachine::new();
    hw.set_hx_c(92.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Idle, 130_000));

    hw.set_hx_c(89.0);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, 5000));
}

// ── Steam ─────────────────────────────────────────────────────

#[test]
fn steam_mode_flushes_then_boosts_after_a_shot() {
    let mut hw = MockMachine::new();
    hw.set_boiler_c(110.0);
    hw.set_pin(InputPin::TwoWaySwitch, true);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert_eq!(app.config().brew_mode, BrewMode::Steam);
    assert!(app.config().steam_boost);

    // HX already above the brew setpoint: straight into the cooling flush.
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::CoolingFlush, 1000));
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(hw.pump);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Idle, 5000));
    assert!(!hw.pump);

    hw.lift_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Brewing, SETTLE_MS));
    run_for(&mut app, &mut hw, &mut sink, 2000);
    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::SteamBoost, SETTLE_MS));
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(hw.heater);
    assert!(!hw.pump);

    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Idle, 61_000));
}

#[test]
fn mode_switch_in_idle_restarts_heating() {
    let mut hw = MockMachine::new();
    hw.set_hx_c(92.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Idle, 130_000));

    hw.set_pin(InputPin::TwoWaySwitch, true);
    run_for(&mut app, &mut hw, &mut sink, 20);
    assert_eq!(app.config().brew_mode, BrewMode::Steam);
    assert!(sink.saw_transition(StateId::Idle, StateId::Heating));
    // Switch positions are not persisted.
    assert!(!app.is_config_dirty());
}

// ── Programmatic flush ────────────────────────────────────────

#[test]
fn flush_command_runs_pump_for_the_window() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("flush 2000", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert_eq!(app.state(), StateId::Heating);
    assert!(hw.pump);
    assert_eq!(hw.pump_power, 100.0);
    run_for(&mut app, &mut hw, &mut sink, 2000);
    assert!(!hw.pump);
}

#[test]
fn lever_cancels_a_running_flush() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("flush 60000", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 200);

    hw.lift_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Brewing, SETTLE_MS));
    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, SETTLE_MS));
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert!(!hw.pump);
}

#[test]
fn flush_refused_while_brewing() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    hw.lift_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Brewing, SETTLE_MS));
    assert!(app.handle_line("flush 1000", &mut hw, &mut sink).is_err());
}

// ── Cleaning ──────────────────────────────────────────────────

#[test]
fn cleaning_runs_ten_lever_repetitions() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.start_cleaning(&mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::CleaningStart);
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(!hw.pump);

    for rep in 1..=10 {
        let beeps = hold_lever_counting_beeps(&mut app, &mut hw, &mut sink, 10_800);
        assert_eq!(app.state(), StateId::CleaningPumping, "rep {rep}");
        assert!(hw.pump, "rep {rep}");
        let expected = if rep == 10 { 2 } else { 1 };
        assert_eq!(beeps, expected, "rep {rep}");

        hw.lower_lever();
        run_for(&mut app, &mut hw, &mut sink, SETTLE_MS);
        assert!(!hw.pump, "rep {rep}");
        if rep < 10 {
            assert_eq!(app.state(), StateId::CleaningPause, "rep {rep}");
        }
    }
    assert_eq!(app.state(), StateId::Heating);
}

#[test]
fn cleaning_resumes_after_tank_refill() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.start_cleaning(&mut hw, &mut sink).is_ok());

    hold_lever_counting_beeps(&mut app, &mut hw, &mut sink, 1000);
    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::CleaningPause, SETTLE_MS));

    hw.set_tank_empty(true);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::WaterEmpty, SETTLE_MS));
    hw.set_tank_empty(false);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::CleaningPause, SETTLE_MS));
}

#[test]
fn cleaning_refused_with_a_cold_group() {
    let mut hw = MockMachine::new();
    hw.set_hx_c(60.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.start_cleaning(&mut hw, &mut sink).is_err());
    assert_eq!(app.state(), StateId::Heating);
}
