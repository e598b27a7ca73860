//! Property tests for the operator-facing parsers and the persisted
//! config blob.
//!
//! Runs on host (x86_64) only. proptest is not available for ESP32
//! targets, so these tests are compiled out there.

#![cfg(not(target_os = "espidf"))]

use espresso_core::app::commands::{self, parse_command};
use espresso_core::config::{PidGains, SystemConfig};
use espresso_core::profile::EspressoProfile;
use espresso_core::sensors::lut::TempLut;
use espresso_core::sensors::pressure;
use proptest::prelude::*;

// ── Console and settings parsers ──────────────────────────────

proptest! {
    /// Whatever arrives on the console, the parser answers with a value
    /// or an error.
    #[test]
    fn command_parser_never_panics(line in "\\PC{0,80}") {
        let _ = parse_command(&line);
    }

    /// Known command words followed by junk still parse or fail cleanly.
    #[test]
    fn known_words_with_junk_arguments(
        word in prop::sample::select(commands::command_names().collect::<Vec<_>>()),
        args in "[ -~]{0,24}",
    ) {
        let _ = parse_command(&format!("{word} {args}"));
    }

    /// A setting line either edits a copy or is refused; a refused line
    /// leaves the copy alone.
    #[test]
    fn setting_lines_never_panic(
        key in "[a-z_]{1,20}",
        value in "\\PC{0,40}",
    ) {
        let mut config = SystemConfig::default();
        let before = config.clone();
        if commands::apply_setting(&mut config, &format!("{key}={value}")).is_err() {
            prop_assert_eq!(config, before);
        }
    }

    #[test]
    fn profile_json_never_panics(json in "\\PC{0,120}") {
        let _ = EspressoProfile::from_json(&json);
    }
}

// ── Persisted config ──────────────────────────────────────────

fn arb_gains() -> impl Strategy<Value = PidGains> {
    (0.0f32..50.0, 0.0f32..50.0, 0.0f32..5.0).prop_map(|(kp, ki, kd)| PidGains::new(kp, ki, kd))
}

proptest! {
    /// Every valid config survives the flash encoding unchanged.
    #[test]
    fn valid_config_survives_postcard(
        brew in 60.0f32..100.0,
        steam in 100.0f32..150.0,
        heater in arb_gains(),
        pressure_gains in arb_gains(),
        offset in any::<i32>(),
        factor in prop_oneof![-1000.0f32..-0.01, 0.01f32..1000.0],
        boost in any::<bool>(),
    ) {
        let config = SystemConfig {
            brew_temp_c: brew,
            steam_temp_c: steam,
            heater_gains: heater,
            pressure_gains,
            scale_offset: offset,
            scale_factor: factor,
            steam_boost: boost,
            ..SystemConfig::default()
        };
        prop_assert!(config.validate().is_ok());

        let bytes = postcard::to_allocvec(&config).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let back: SystemConfig =
            postcard::from_bytes(&bytes).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(&back, &config);
        prop_assert!(back.validate().is_ok());
    }

    /// Truncated blobs never decode into something that passes for a
    /// config.
    #[test]
    fn truncated_blob_is_rejected(cut in 1usize..40) {
        let bytes = postcard::to_allocvec(&SystemConfig::default())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let cut = cut.min(bytes.len());
        let truncated = &bytes[..bytes.len() - cut];
        prop_assert!(postcard::from_bytes::<SystemConfig>(truncated).is_err());
    }
}

// ── Sensor scaling ────────────────────────────────────────────

proptest! {
    /// The simulated front-end and the converter agree across the
    /// working range.
    #[test]
    fn temperature_code_round_trip(t in 20.0f32..140.0) {
        let lut = TempLut::from_legacy();
        let back = lut.convert(lut.code_for(t));
        prop_assert!((back - t).abs() < 0.5, "{} -> {}", t, back);
    }

    #[test]
    fn temperature_is_finite_for_any_code(code in any::<i32>()) {
        let lut = TempLut::from_legacy();
        prop_assert!(lut.convert(code).is_finite());
    }

    #[test]
    fn pressure_stays_in_transducer_range(code in any::<i32>()) {
        let bar = pressure::code_to_bar(code);
        prop_assert!((0.0..=16.0).contains(&bar));
    }

    #[test]
    fn pressure_code_round_trip(bar in 0.0f32..16.0) {
        let back = pressure::code_to_bar(pressure::bar_to_code(bar));
        prop_assert!((back - bar).abs() < 0.01);
    }
}
