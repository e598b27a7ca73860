//! Integration tests for the AppService → FSM → actuators pipeline:
//! boot selection, fault handling and the recovery paths.

use crate::mock_hw::{MockMachine, boot, boot_to_heating, run_for, run_until};

use espresso_core::app::events::AppEvent;
use espresso_core::app::ports::Led;
use espresso_core::config::SystemConfig;
use espresso_core::error::SafetyFault;
use espresso_core::fsm::StateId;
use espresso_core::pins::AdcChannel;

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn cold_boot_passes_through_init() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot(&mut hw, SystemConfig::default());
    assert_eq!(app.state(), StateId::Init);
    assert_eq!(sink.events.first(), Some(&AppEvent::Started(StateId::Init)));
    // Outputs are forced off before anything else runs.
    assert!(hw.all_off_calls >= 1);
    assert_eq!(hw.configure_calls, 1);

    run_for(&mut app, &mut hw, &mut sink, 20);
    assert_eq!(app.state(), StateId::Heating);
    assert!(sink.saw_transition(StateId::Init, StateId::Heating));
}

#[test]
fn heating_drives_the_element_when_cold() {
    let mut hw = MockMachine::new();
    hw.set_boiler_c(60.0);
    hw.set_hx_c(40.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert_eq!(app.state(), StateId::Heating);
    assert!(hw.heater);
    assert!(!hw.pump);
}

// ── Sensor faults ─────────────────────────────────────────────

#[test]
fn railed_sensor_stops_everything_until_it_recovers() {
    let mut hw = MockMachine::new();
    hw.set_boiler_c(60.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(hw.heater);

    let good = hw.adc[AdcChannel::Boiler as usize];
    hw.adc[AdcChannel::Boiler as usize] = 10;
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Error, 2000));
    assert!(!hw.heater);
    assert!(!hw.pump);
    assert_ne!(app.fault_flags() & SafetyFault::BoilerSensorRailed as u8, 0);
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, AppEvent::FaultDetected(_)))
    );

    // Still faulted: the machine stays put.
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert_eq!(app.state(), StateId::Error);

    hw.adc[AdcChannel::Boiler as usize] = good;
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, 3000));
    assert_eq!(app.fault_flags(), 0);
    assert!(sink.events.contains(&AppEvent::FaultCleared));
}

#[test]
fn lasterror_names_the_sensor() {
    let mut hw = MockMachine::new();
    hw.adc[AdcChannel::Hx as usize] = 32_700;
    let (mut app, mut sink) = boot(&mut hw, SystemConfig::default());
    assert_eq!(app.state(), StateId::Error);
    let reply = app.handle_line("lasterror", &mut hw, &mut sink);
    assert!(reply.is_ok_and(|r| r.contains("HX")));
}

// ── Water tank ────────────────────────────────────────────────

#[test]
fn empty_tank_preempts_and_recovers() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    hw.set_tank_empty(true);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::WaterEmpty, 1000));
    assert!(!hw.heater);
    assert!(!hw.pump);

    run_for(&mut app, &mut hw, &mut sink, 1000);
    assert_eq!(app.state(), StateId::WaterEmpty);
    // The water LED blinks while the tank is empty.
    let mut lit = false;
    for _ in 0..150 {
        run_for(&mut app, &mut hw, &mut sink, 10);
        lit |= hw.led(Led::Water);
    }
    assert!(lit);

    hw.set_tank_empty(false);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, 1000));
}

#[test]
fn brief_water_glitch_is_debounced() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    hw.set_tank_empty(true);
    run_for(&mut app, &mut hw, &mut sink, 30);
    hw.set_tank_empty(false);
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert_eq!(app.state(), StateId::Heating);
}

// ── Boiler level ──────────────────────────────────────────────

#[test]
fn dry_boiler_refills_then_resumes_heating() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    hw.boiler_water = false;
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::BoilerEmpty, 12_000));
    run_for(&mut app, &mut hw, &mut sink, 50);
    assert!(hw.pump);
    assert!(hw.fill_valve);
    assert!(hw.probe);
    assert!(!hw.heater);

    hw.boiler_water = true;
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, 1000));
    assert!(!hw.fill_valve);
    // The level monitor does not bounce straight back to empty.
    run_for(&mut app, &mut hw, &mut sink, 10_000);
    assert_eq!(app.state(), StateId::Heating);
}

#[test]
fn boiler_fill_pauses_while_lever_is_up() {
    let mut hw = MockMachine::new();
    hw.boiler_water = false;
    let (mut app, mut sink) = boot(&mut hw, SystemConfig::default());
    assert_eq!(app.state(), StateId::BoilerEmpty);
    run_for(&mut app, &mut hw, &mut sink, 50);
    assert!(hw.fill_valve);

    hw.lift_lever();
    run_for(&mut app, &mut hw, &mut sink, 300);
    assert_eq!(app.state(), StateId::BoilerEmpty);
    assert!(!hw.pump);
    assert!(!hw.fill_valve);
}

// ── Standby ───────────────────────────────────────────────────

#[test]
fn long_idle_enters_standby_and_lever_wakes() {
    let mut hw = MockMachine::new();
    // HX on the brew setpoint so HEATING settles into IDLE.
    hw.set_hx_c(92.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Idle, 130_000));
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Standby, 16 * 60 * 1000));
    assert!(!hw.heater);

    hw.lift_lever();
    run_for(&mut app, &mut hw, &mut sink, 300);
    assert_eq!(app.state(), StateId::Standby);
    hw.lower_lever();
    assert!(run_until(&mut app, &mut hw, &mut sink, StateId::Heating, 500));
}

// ── DEBUG ─────────────────────────────────────────────────────

#[test]
fn debug_suspends_automatic_actuation() {
    let mut hw = MockMachine::new();
    hw.set_boiler_c(60.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(hw.heater);

    assert!(app.handle_line("debug", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert_eq!(app.state(), StateId::Debug);
    assert!(!hw.heater);

    // A tank alarm does not pull the machine out of DEBUG.
    hw.set_tank_empty(true);
    run_for(&mut app, &mut hw, &mut sink, 500);
    assert_eq!(app.state(), StateId::Debug);

    assert!(app.handle_line("pump on", &mut hw, &mut sink).is_ok());
    assert!(hw.pump);
    assert!(app.handle_line("readadc 0", &mut hw, &mut sink).is_ok());
    assert!(app.handle_line("readpin brew_switch", &mut hw, &mut sink).is_ok());
}
