//! Two-step load-cell calibration wizard and the blocking averaged read it
//! is built on.
//!
//! ```text
//!  start ─▶ CALIBRATION_EMPTY ──[next: tare]──▶ CALIBRATION_TEST_WEIGHT
//!                                                   │
//!                              [next <grams>: weigh, persist]
//!                                                   ▼
//!                                          state before calibration
//! ```
//!
//! Averaging busy-waits on the converter.  It only runs inside the
//! service's maintenance section, never from the brewing path.

use log::{info, warn};

use crate::app::ports::{ClockPort, ScaleCode, ScalePort};
use crate::error::{CalibrationError, SensorError};
use crate::fsm::StateId;

/// Readings averaged for a tare or a weigh step.
pub const STABLE_READINGS: usize = 16;

/// Conversions thrown away after the channel is (re)selected.
pub const DISCARD_READINGS: usize = 4;

/// 1 ms polls allowed while waiting for one conversion.
pub const MAX_WAIT_POLLS: u32 = 1000;

/// Full-scale or not-ready conversions tolerated per average.
pub const MAX_REJECTED_READINGS: usize = 64;

/// Block until one conversion is available and clock it out.
fn wait_and_read<S: ScalePort + ClockPort>(scale: &mut S) -> Result<ScaleCode, SensorError> {
    let mut polls = 0;
    while !scale.conversion_available() {
        if polls >= MAX_WAIT_POLLS {
            return Err(SensorError::Timeout);
        }
        scale.delay_ms(1);
        polls += 1;
    }
    Ok(scale.read_conversion())
}

/// Average `times` valid conversions after discarding the first few.
///
/// Full-scale readings are skipped and do not count towards `times`.
/// The data-ready flag is cleared afterwards so the next tick does not
/// pick up a conversion taken during the average.
pub fn stable_average<S: ScalePort + ClockPort>(
    scale: &mut S,
    times: usize,
) -> Result<i32, SensorError> {
    let times = times.max(1);
    scale.configure();

    for _ in 0..DISCARD_READINGS {
        wait_and_read(scale)?;
    }

    let mut total: i64 = 0;
    let mut taken = 0;
    let mut rejected = 0;
    while taken < times {
        match wait_and_read(scale)? {
            ScaleCode::Value(v) => {
                total += i64::from(v);
                taken += 1;
            }
            ScaleCode::FullScale | ScaleCode::NotReady => {
                rejected += 1;
                if rejected > MAX_REJECTED_READINGS {
                    warn!("Scale average aborted after {rejected} rejected readings");
                    return Err(SensorError::Timeout);
                }
            }
        }
    }

    scale.data_ready().clear();
    let avg = (total / times as i64) as i32;
    info!("Scale average over {times} readings: {avg}");
    Ok(avg)
}

// ---------------------------------------------------------------------------
// Wizard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    /// Scale empty; next step records the offset.
    AwaitTare,
    /// Offset recorded; next step needs the test weight.
    AwaitWeigh,
}

impl CalibrationStep {
    /// Step pending in machine state `state`.
    pub fn for_state(state: StateId) -> Option<Self> {
        match state {
            StateId::CalibrationEmpty => Some(Self::AwaitTare),
            StateId::CalibrationTestWeight => Some(Self::AwaitWeigh),
            _ => None,
        }
    }
}

/// Result of one wizard step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    /// Offset captured; move to the weigh step.
    Tared { offset: i32 },
    /// Calibration finished; persist and go back to `return_to`.
    Complete {
        offset: i32,
        scale: f32,
        return_to: StateId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationContext {
    pub test_weight_g: f32,
    pub offset: i32,
    pub scale: f32,
    pub return_state: StateId,
}

impl Default for CalibrationContext {
    fn default() -> Self {
        Self {
            test_weight_g: 0.0,
            offset: 0,
            scale: 1.0,
            return_state: StateId::Heating,
        }
    }
}

impl CalibrationContext {
    /// Arm the wizard from `current`.  Only DEBUG, IDLE and HEATING may
    /// hand the scale over.
    pub fn begin(&mut self, current: StateId) -> Result<(), CalibrationError> {
        if !matches!(current, StateId::Debug | StateId::Idle | StateId::Heating) {
            return Err(CalibrationError::NotAllowed);
        }
        self.return_state = current;
        info!("Scale calibration started from {current:?}");
        Ok(())
    }

    /// Run the step pending in `state`.  `weight_g` is only used by the
    /// weigh step; a non-positive weight leaves the wizard where it is.
    pub fn advance<S: ScalePort + ClockPort>(
        &mut self,
        state: StateId,
        weight_g: f32,
        scale: &mut S,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        match CalibrationStep::for_state(state) {
            Some(CalibrationStep::AwaitTare) => {
                self.offset = stable_average(scale, STABLE_READINGS)?;
                info!("Calibration tare complete, offset {}", self.offset);
                Ok(CalibrationOutcome::Tared {
                    offset: self.offset,
                })
            }
            Some(CalibrationStep::AwaitWeigh) => {
                if weight_g <= 0.0 || !weight_g.is_finite() {
                    return Err(CalibrationError::InvalidWeight);
                }
                let loaded = stable_average(scale, STABLE_READINGS)?;
                let factor = (loaded - self.offset) as f32 / weight_g;
                if factor == 0.0 || !factor.is_finite() {
                    warn!("Calibration produced unusable scale factor {factor}");
                    return Err(CalibrationError::InvalidWeight);
                }
                self.test_weight_g = weight_g;
                self.scale = factor;
                info!("Calibration complete, scale factor {factor:.4}");
                Ok(CalibrationOutcome::Complete {
                    offset: self.offset,
                    scale: factor,
                    return_to: self.return_state,
                })
            }
            None => Err(CalibrationError::NotCalibrating),
        }
    }
}
