//! Scale calibration wizard and tare, end to end through the service.

use crate::mock_hw::{MockMachine, MockNvs, boot_to_heating, run_for};

use espresso_core::app::events::AppEvent;
use espresso_core::error::{CalibrationError, Error};
use espresso_core::fsm::StateId;

/// Discarded plus averaged conversions for one wizard step.
const READS_PER_STEP: usize = 20;

#[test]
fn wizard_over_the_settings_channel_persists_immediately() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let nvs = MockNvs::new();

    assert!(app.handle_line("set calibratescale=1", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::CalibrationEmpty);
    run_for(&mut app, &mut hw, &mut sink, 100);
    assert!(!hw.pump);

    hw.queue_scale(-500, READS_PER_STEP);
    assert!(app.handle_line("set calibration_step=0", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::CalibrationTestWeight);

    hw.queue_scale(19_500, READS_PER_STEP);
    assert!(app.handle_line("set calibration_step=50", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::Heating);
    assert!(sink.events.contains(&AppEvent::ScaleCalibrated {
        offset: -500,
        factor: 400.0,
    }));

    // No debounce delay for calibration results.
    assert!(app.auto_save_if_needed(&nvs));
    let stored = nvs.stored();
    assert_eq!(stored.as_ref().map(|c| c.scale_offset), Some(-500));
    assert_eq!(stored.as_ref().map(|c| c.scale_factor), Some(400.0));

    // New calibration applies to live readings.
    hw.push_scale(39_500);
    run_for(&mut app, &mut hw, &mut sink, 10);
    assert!((app.raw_readings().raw_weight_g - 100.0).abs() < 0.01);
}

#[test]
fn wizard_returns_to_idle_when_started_there() {
    let mut hw = MockMachine::new();
    hw.set_hx_c(92.0);
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(crate::mock_hw::run_until(
        &mut app,
        &mut hw,
        &mut sink,
        StateId::Idle,
        130_000
    ));

    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_ok());
    hw.queue_scale(0, READS_PER_STEP);
    assert!(app.handle_line("calibratenext", &mut hw, &mut sink).is_ok());
    hw.queue_scale(10_000, READS_PER_STEP);
    assert!(app.handle_line("calibratenext 25", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(app.config().scale_factor, 400.0);
}

#[test]
fn non_positive_test_weight_keeps_the_step() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_ok());
    hw.queue_scale(0, READS_PER_STEP);
    assert!(app.handle_line("calibratenext", &mut hw, &mut sink).is_ok());

    let err = app.handle_line("calibratenext -3", &mut hw, &mut sink);
    assert_eq!(err, Err(Error::Calibration(CalibrationError::InvalidWeight)));
    assert_eq!(app.state(), StateId::CalibrationTestWeight);

    hw.queue_scale(5_000, READS_PER_STEP);
    assert!(app.handle_line("calibratenext 10", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::Heating);
    assert_eq!(app.config().scale_factor, 500.0);
}

#[test]
fn silent_converter_times_out() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_ok());

    let before = hw.now;
    let err = app.handle_line("calibratenext", &mut hw, &mut sink);
    assert_eq!(err, Err(Error::Calibration(CalibrationError::Timeout)));
    assert_eq!(app.state(), StateId::CalibrationEmpty);
    // The wait is bounded.
    assert!(hw.now - before <= 2_000);
}

#[test]
fn next_without_wizard_is_rejected() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let err = app.handle_line("calibratenext 100", &mut hw, &mut sink);
    assert_eq!(err, Err(Error::Calibration(CalibrationError::NotCalibrating)));
}

#[test]
fn maintenance_is_refused_mid_shot() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    hw.lift_lever();
    run_for(&mut app, &mut hw, &mut sink, 200);
    assert_eq!(app.state(), StateId::Brewing);

    hw.queue_scale(100, READS_PER_STEP);
    assert!(app.handle_line("tare_scale", &mut hw, &mut sink).is_err());
    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_err());
    assert_eq!(app.state(), StateId::Brewing);
}

#[test]
fn tare_zeroes_without_persisting() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let nvs = MockNvs::new();

    hw.queue_scale(4_321, READS_PER_STEP);
    assert!(app.handle_line("tare_scale", &mut hw, &mut sink).is_ok());
    assert_eq!(app.config().scale_offset, 4_321);

    run_for(&mut app, &mut hw, &mut sink, 6_000);
    assert!(!app.auto_save_if_needed(&nvs));
    assert_eq!(nvs.saves(), 0);

    hw.push_scale(4_321);
    run_for(&mut app, &mut hw, &mut sink, 10);
    assert!(app.raw_readings().raw_weight_g.abs() < 0.01);
}

/// Feed a steady load so the weight estimate is well away from zero.
fn load_the_cup(
    app: &mut espresso_core::app::service::AppService,
    hw: &mut MockMachine,
    sink: &mut crate::mock_hw::RecordingSink,
) -> (f32, f32) {
    for raw in [18, 18, 19, 18, 18] {
        hw.push_scale(raw);
        run_for(app, hw, sink, 100);
    }
    let r = app.raw_readings();
    assert!(r.weight_g > 1.0, "weight {}", r.weight_g);
    (r.weight_g, r.raw_weight_g)
}

#[test]
fn refused_weigh_step_keeps_the_weight() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_ok());
    hw.queue_scale(0, READS_PER_STEP);
    assert!(app.handle_line("calibratenext", &mut hw, &mut sink).is_ok());
    assert_eq!(app.state(), StateId::CalibrationTestWeight);

    let before = load_the_cup(&mut app, &mut hw, &mut sink);
    let err = app.handle_line("calibratenext 0", &mut hw, &mut sink);
    assert_eq!(err, Err(Error::Calibration(CalibrationError::InvalidWeight)));
    let r = app.raw_readings();
    assert_eq!((r.weight_g, r.raw_weight_g), before);
    assert_eq!(app.state(), StateId::CalibrationTestWeight);
}

#[test]
fn failed_scale_work_keeps_the_weight() {
    let mut hw = MockMachine::new();
    let (mut app, mut sink) = boot_to_heating(&mut hw);
    let before = load_the_cup(&mut app, &mut hw, &mut sink);
    let unchanged = |app: &espresso_core::app::service::AppService| {
        let r = app.raw_readings();
        (r.weight_g, r.raw_weight_g) == before
    };

    assert_eq!(
        app.handle_line("calibratenext 5", &mut hw, &mut sink),
        Err(Error::Calibration(CalibrationError::NotCalibrating))
    );
    assert!(unchanged(&app));

    // Nothing queued: the blocking averages time out.
    assert!(app.handle_line("tare_scale", &mut hw, &mut sink).is_err());
    assert!(unchanged(&app));
    assert_eq!(app.config().scale_offset, 0);

    assert!(app.handle_line("calibratescale", &mut hw, &mut sink).is_ok());
    assert!(app.handle_line("calibratenext", &mut hw, &mut sink).is_err());
    assert!(unchanged(&app));
}
