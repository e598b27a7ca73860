//! Settings channel, console commands and config persistence.

use crate::mock_hw::{MockMachine, MockNvs, boot_to_heating, run_for};

use espresso_core::app::events::AppEvent;
use espresso_core::app::service::AUTO_SAVE_DELAY_MS;
use espresso_core::config::{BrewMode, SystemConfig};
use espresso_core::error::{CommandError, Error};
use espresso_core::fsm::StateId;
use espresso_core::pins::InputPin;

// ── Validation ────────────────────────────────────────────────

#[test]
fn rejected_value_leaves_config_untouched() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let before = app.config().clone();

    assert!(app.handle_line("set tempsetsteam=400", &mut hw, &mut sink).is_err());
    assert!(app.handle_line("set weight_kalman_e=0", &mut hw, &mut sink).is_err());
    assert!(app.handle_line("set kp_pressure=abc", &mut hw, &mut sink).is_err());
    assert_eq!(app.config(), &before);
    assert!(!app.is_config_dirty());
    assert!(
        !sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::SettingChanged(_)))
    );
}

#[test]
fn malformed_lines_name_the_problem() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    assert_eq!(
        app.handle_line("set tempsetbrew", &mut hw, &mut sink),
        Err(Error::Command(CommandError::MissingSeparator))
    );
    assert_eq!(
        app.handle_line("set grind_size=7", &mut hw, &mut sink),
        Err(Error::Command(CommandError::UnknownKey))
    );
    assert_eq!(
        app.handle_line("espresso please", &mut hw, &mut sink),
        Err(Error::Command(CommandError::UnknownCommand))
    );
    assert_eq!(
        app.handle_line("set profile_data={\"n\":", &mut hw, &mut sink),
        Err(Error::Command(CommandError::Json))
    );
}

#[test]
fn hardware_commands_need_debug() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert_eq!(
        app.handle_line("heater on", &mut hw, &mut sink),
        Err(Error::Command(CommandError::DebugOnly))
    );
    assert_eq!(
        app.handle_line("writepin heater_ssr high", &mut hw, &mut sink),
        Err(Error::Command(CommandError::DebugOnly))
    );
    assert!(hw.writes.is_empty());
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn change_is_saved_after_the_quiet_period() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let nvs = MockNvs::new();

    assert!(app.handle_line("set kp_temperature=12.5", &mut hw, &mut sink).is_ok());
    assert!(app.is_config_dirty());
    assert!(sink.events.contains(&AppEvent::SettingChanged("kp_temperature")));

    run_for(&mut app, &mut hw, &mut sink, AUTO_SAVE_DELAY_MS / 2);
    assert!(!app.auto_save_if_needed(&nvs));

    // A second edit inside the window does not restart the timer.
    assert!(app.handle_line("set ki_temperature=0.3", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, AUTO_SAVE_DELAY_MS / 2 + 100);
    assert!(app.auto_save_if_needed(&nvs));
    assert_eq!(nvs.saves(), 1);

    let stored = nvs.stored().unwrap_or_default();
    assert_eq!(stored.heater_gains.kp, 12.5);
    assert_eq!(stored.heater_gains.ki, 0.3);
    assert!(!app.is_config_dirty());
    assert!(!app.auto_save_if_needed(&nvs));
}

#[test]
fn same_value_is_not_a_change() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let current = app.config().steam_temp_c;
    let line = format!("set tempsetsteam={current}");
    assert!(app.handle_line(&line, &mut hw, &mut sink).is_ok());
    assert!(!app.is_config_dirty());
}

#[test]
fn force_save_flushes_pending_edits() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let nvs = MockNvs::with(SystemConfig::default());

    assert!(!app.force_save_if_dirty(&nvs));
    assert!(app.handle_line("set mqtt_server=broker.local", &mut hw, &mut sink).is_ok());
    assert!(app.force_save_if_dirty(&nvs));
    assert_eq!(
        nvs.stored().map(|c| c.mqtt_server.as_str().to_owned()),
        Some("broker.local".to_owned())
    );
}

// ── Setpoint and mode overrides ───────────────────────────────

#[test]
fn brew_setpoint_override_and_back_to_the_switch() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert_eq!(app.config().brew_temp_c, 92.0);

    assert!(app.handle_line("set tempsetbrew=94.5", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert_eq!(app.config().brew_temp_c, 94.5);
    assert!(app.config().brew_temp_override);

    assert!(app.handle_line("set tempsetbrew=auto", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert!(!app.config().brew_temp_override);
    assert_eq!(app.config().brew_temp_c, 92.0);
}

#[test]
fn brewmode_override_ignores_the_switch_until_auto() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    assert!(app.handle_line("set brewmode=steam", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert_eq!(app.config().brew_mode, BrewMode::Steam);

    // Switch still on coffee; the override holds.
    run_for(&mut app, &mut hw, &mut sink, 1000);
    assert_eq!(app.config().brew_mode, BrewMode::Steam);

    assert!(app.handle_line("set brewmode=auto", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert_eq!(app.config().brew_mode, BrewMode::Coffee);

    hw.set_pin(InputPin::TwoWaySwitch, true);
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert_eq!(app.config().brew_mode, BrewMode::Steam);
}

// ── Profiling ─────────────────────────────────────────────────

#[test]
fn profile_settings_reach_the_config() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    let line = r#"set profile_data={"n":"Slayer","m":0,"s":[[3.0,8.0],[9.0,20.0]]}"#;
    assert!(app.handle_line(line, &mut hw, &mut sink).is_ok());
    assert!(app.handle_line("set profiling_source=pressure", &mut hw, &mut sink).is_ok());
    assert_eq!(app.config().profile.name.as_str(), "Slayer");
    assert_eq!(app.config().profile.steps.len(), 2);
    assert!(app.config().profiling_source.is_some());

    assert!(app.handle_line("set profiling_source=none", &mut hw, &mut sink).is_ok());
    assert!(app.config().profiling_source.is_none());
    assert!(
        app.handle_line("set profiling_source=espresso", &mut hw, &mut sink)
            .is_err()
    );
}

// ── Actions ───────────────────────────────────────────────────

#[test]
fn request_publishes_telemetry_now() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let before = sink.telemetry().len();
    assert!(app.handle_line("set request=1", &mut hw, &mut sink).is_ok());
    assert_eq!(sink.telemetry().len(), before + 1);
    assert!(sink.telemetry().last().is_some_and(|t| t.state == StateId::Heating));
}

#[test]
fn start_cleaning_over_the_settings_channel() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("set start_cleaning=1", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::CleaningStart);
}

// ── Console ───────────────────────────────────────────────────

#[test]
fn status_and_help_describe_the_machine() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);

    let status = app.handle_line("status", &mut hw, &mut sink);
    assert!(status.as_ref().is_ok_and(|s| s.contains("HEATING")), "{status:?}");

    let help = app.handle_line("help", &mut hw, &mut sink);
    assert!(help.is_ok_and(|h| h.contains("calibratescale") && h.contains("flush")));

    let pid = app.handle_line("pumppid", &mut hw, &mut sink);
    assert!(pid.is_ok_and(|p| p.contains("Pressure PID")));

    let last = app.handle_line("lasterror", &mut hw, &mut sink);
    assert!(last.is_ok_and(|l| l.starts_with("No critical error")));
}

#[test]
fn raw_stream_follows_the_toggle() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("debug", &mut hw, &mut sink).is_ok());
    assert!(app.handle_line("rawdata on", &mut hw, &mut sink).is_ok());
    // Raw readings ride along with the once-a-second telemetry.
    run_for(&mut app, &mut hw, &mut sink, 1100);
    let raw = |sink: &crate::mock_hw::RecordingSink| {
        sink.events
            .iter()
            .filter(|e| matches!(e, AppEvent::RawData(_)))
            .count()
    };
    let streamed = raw(&sink);
    assert!(streamed > 0);

    assert!(app.handle_line("rawdata off", &mut hw, &mut sink).is_ok());
    run_for(&mut app, &mut hw, &mut sink, 1000);
    assert_eq!(raw(&sink), streamed);
}
