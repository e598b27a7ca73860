//! Thermistor lookup table and piecewise-linear interpolation.
//!
//! The boiler and HX thermistors sit on the 16-bit ADS1115 front-end
//! (±4.096 V full scale, 3 V divider supply).  The curve is not stored in
//! that domain: it is rebuilt at boot from the legacy 10-bit table by
//! replaying the old divider maths for every legacy code.

use super::legacy_table::LEGACY_TEMP_TABLE;

/// Highest positive ADS1115 code.
pub const ADC_FULL_SCALE_CODE: i32 = 32767;
/// ADS1115 full-scale voltage at the configured gain.
pub const ADC_FULL_SCALE_V: f32 = 4.096;

// Legacy front-end: 7.15 kOhm pull-up to 5 V, 10-bit ADC.
const LEGACY_SUPPLY_V: f32 = 5.0;
const LEGACY_ADC_MAX: f32 = 1023.0;
const LEGACY_PULLUP_OHM: f32 = 7150.0;

// Current front-end: 10 kOhm reference to 3 V.
const DIVIDER_SUPPLY_V: f32 = 3.0;
const DIVIDER_REF_OHM: f32 = 10_000.0;

/// Interpolate `y(x)` over a table with strictly increasing `xs`.
///
/// Queries outside the table extrapolate along the two nearest boundary
/// points, unless `trim` is set, in which case they clamp to the end
/// values.
pub fn interpolate(xs: &[f32], ys: &[f32], x: f32, trim: bool) -> f32 {
    let n = xs.len().min(ys.len());
    match n {
        0 => return 0.0,
        1 => return ys[0],
        _ => {}
    }

    if trim {
        if x <= xs[0] {
            return ys[0];
        }
        if x >= xs[n - 1] {
            return ys[n - 1];
        }
    }

    if x <= xs[0] {
        return extrapolate(xs[0], ys[0], xs[1], ys[1], x);
    }
    if x >= xs[n - 1] {
        return extrapolate(xs[n - 2], ys[n - 2], xs[n - 1], ys[n - 1], x);
    }

    // First index whose x is strictly greater than the query.
    let upper = xs[..n].partition_point(|&v| v <= x);
    let i = upper - 1;
    let span = xs[i + 1] - xs[i];
    if span <= 0.0 {
        return ys[i];
    }
    let t = (x - xs[i]) / span;
    ys[i] * (1.0 - t) + ys[i + 1] * t
}

fn extrapolate(x0: f32, y0: f32, x1: f32, y1: f32, x: f32) -> f32 {
    let dx = x1 - x0;
    if dx == 0.0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / dx
}

/// ADC-code → temperature table.
#[derive(Debug, Clone)]
pub struct TempLut {
    codes: Vec<f32>,
    temps_c: Vec<f32>,
}

impl TempLut {
    /// Build a table from explicit points.  `codes` must be increasing.
    pub fn new(codes: Vec<f32>, temps_c: Vec<f32>) -> Self {
        Self { codes, temps_c }
    }

    /// Re-map the legacy 10-bit curve onto the ADS1115 code domain.
    pub fn from_legacy() -> Self {
        let mut codes = Vec::with_capacity(LEGACY_TEMP_TABLE.len());
        let mut temps_c = Vec::with_capacity(LEGACY_TEMP_TABLE.len());

        for (i, &tenths) in LEGACY_TEMP_TABLE.iter().enumerate() {
            codes.push(legacy_index_to_code(i));
            temps_c.push(f32::from(tenths) / 10.0);
        }

        Self { codes, temps_c }
    }

    /// Convert an ADS1115 code to °C.  Codes outside `[0, full-scale)`
    /// return 0.
    pub fn convert(&self, code: i32) -> f32 {
        if !(0..ADC_FULL_SCALE_CODE).contains(&code) {
            return 0.0;
        }
        interpolate(&self.codes, &self.temps_c, code as f32, false)
    }

    /// Inverse lookup, used by simulated front-ends and tests.
    pub fn code_for(&self, temp_c: f32) -> i32 {
        interpolate(&self.temps_c, &self.codes, temp_c, false).round() as i32
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Resistance implied by a legacy reading, then the voltage the same
/// thermistor produces on the current divider, expressed as an ADS1115 code.
fn legacy_index_to_code(i: usize) -> f32 {
    if i == 0 {
        // Open thermistor: infinite resistance, zero volts.
        return 0.0;
    }
    let v_old = i as f32 * LEGACY_SUPPLY_V / LEGACY_ADC_MAX;
    let r_ntc = LEGACY_PULLUP_OHM * (LEGACY_SUPPLY_V - v_old) / v_old;
    let v_new = DIVIDER_SUPPLY_V * (DIVIDER_REF_OHM / (r_ntc + DIVIDER_REF_OHM));
    v_new / ADC_FULL_SCALE_V * ADC_FULL_SCALE_CODE as f32
}
