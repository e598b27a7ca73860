//! Pressure transducer scaling.
//!
//! 0.5–4.5 V ratiometric sensor behind a divider, read on ADS1115
//! channel 3.  The usable band maps linearly onto 0–16 bar.

use super::lut::{ADC_FULL_SCALE_CODE, ADC_FULL_SCALE_V};

const VOLTAGE_MIN: f32 = 0.392;
const VOLTAGE_MAX: f32 = 3.683;
const BAR_MAX: f32 = 16.0;

/// Convert an ADS1115 code to bar, clamped to the transducer range.
pub fn code_to_bar(code: i32) -> f32 {
    let volts = code as f32 / ADC_FULL_SCALE_CODE as f32 * ADC_FULL_SCALE_V;
    let volts = volts.clamp(VOLTAGE_MIN, VOLTAGE_MAX);
    (volts - VOLTAGE_MIN) * (BAR_MAX / (VOLTAGE_MAX - VOLTAGE_MIN))
}

/// Inverse of [`code_to_bar`] for simulated front-ends.
pub fn bar_to_code(bar: f32) -> i32 {
    let volts = VOLTAGE_MIN + bar.clamp(0.0, BAR_MAX) * (VOLTAGE_MAX - VOLTAGE_MIN) / BAR_MAX;
    (volts / ADC_FULL_SCALE_V * ADC_FULL_SCALE_CODE as f32).round() as i32
}
