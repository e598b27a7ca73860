//! One-dimensional Kalman filter for slowly varying scalar signals.
//!
//! Used twice: once on the load-cell weight and once on the derived flow
//! rate.  The model is a constant signal plus noise, so the gain depends
//! only on the ratio between the running estimate error and the
//! configured measurement error.

use serde::{Deserialize, Serialize};

/// Tunable filter parameters, persisted with the rest of the config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanParams {
    /// Expected spread of a single measurement.
    pub measurement_error: f32,
    /// Initial uncertainty of the estimate.
    pub estimate_error: f32,
    /// How fast the underlying value is expected to move.
    pub process_noise: f32,
}

impl KalmanParams {
    pub const fn new(measurement_error: f32, estimate_error: f32, process_noise: f32) -> Self {
        Self {
            measurement_error,
            estimate_error,
            process_noise,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScalarKalman {
    params: KalmanParams,
    estimate_error: f32,
    last_estimate: f32,
}

impl ScalarKalman {
    pub fn new(params: KalmanParams) -> Self {
        Self {
            params,
            estimate_error: params.estimate_error,
            last_estimate: 0.0,
        }
    }

    /// Fold one measurement into the estimate and return it.
    pub fn update(&mut self, measurement: f32) -> f32 {
        let denom = self.estimate_error + self.params.measurement_error;
        let gain = if denom > 0.0 {
            self.estimate_error / denom
        } else {
            1.0
        };
        let estimate = self.last_estimate + gain * (measurement - self.last_estimate);
        self.estimate_error = (1.0 - gain) * self.estimate_error
            + (self.last_estimate - estimate).abs() * self.params.process_noise;
        self.last_estimate = estimate;
        estimate
    }

    /// Drop the estimate and restore the configured estimate error.
    pub fn reset(&mut self) {
        self.last_estimate = 0.0;
        self.estimate_error = self.params.estimate_error;
    }

    /// Swap tuning without discarding the running estimate.
    pub fn retune(&mut self, params: KalmanParams) {
        self.params = params;
        self.estimate_error = params.estimate_error;
    }

    pub fn set_measurement_error(&mut self, value: f32) {
        self.params.measurement_error = value;
    }

    pub fn set_estimate_error(&mut self, value: f32) {
        self.params.estimate_error = value;
        self.estimate_error = value;
    }

    pub fn set_process_noise(&mut self, value: f32) {
        self.params.process_noise = value;
    }

    pub fn estimate(&self) -> f32 {
        self.last_estimate
    }

    pub fn params(&self) -> KalmanParams {
        self.params
    }
}
