//! Load-cell weight and derived flow rate.
//!
//! ```text
//!  raw code ─▶ (raw − offset) / scale ─▶ SpikeGuard ─▶ weight Kalman ─▶ grams
//!                                                         │
//!                                           d/dt while shot active
//!                                                         ▼
//!                                                    flow Kalman ─▶ g/s
//! ```

use super::kalman::{KalmanParams, ScalarKalman};
use super::spike_guard::SpikeGuard;

/// Flow keeps being computed this long after the lever drops.
pub const POST_SHOT_DRIP_MS: u64 = 3000;

/// Weight/flow estimator fed by accepted load-cell conversions.
#[derive(Debug, Clone)]
pub struct WeightPipeline {
    offset: i32,
    scale: f32,
    guard: SpikeGuard,
    weight_filter: ScalarKalman,
    flow_filter: ScalarKalman,
    weight_g: f32,
    raw_weight_g: f32,
    flow_g_per_s: f32,
    prev_flow_ms: u64,
    prev_flow_weight: f32,
    flow_reset_done: bool,
}

impl WeightPipeline {
    pub fn new(offset: i32, scale: f32, weight: KalmanParams, flow: KalmanParams) -> Self {
        Self {
            offset,
            scale,
            guard: SpikeGuard::default(),
            weight_filter: ScalarKalman::new(weight),
            flow_filter: ScalarKalman::new(flow),
            weight_g: 0.0,
            raw_weight_g: 0.0,
            flow_g_per_s: 0.0,
            prev_flow_ms: 0,
            prev_flow_weight: 0.0,
            flow_reset_done: false,
        }
    }

    /// Convert a raw conversion to grams with the current calibration.
    pub fn to_grams(&self, raw: i32) -> f32 {
        if self.scale == 0.0 {
            return 0.0;
        }
        (raw - self.offset) as f32 / self.scale
    }

    /// Feed one valid conversion.  `shot_active` gates the flow estimate.
    pub fn process(&mut self, raw: i32, now_ms: u64, shot_active: bool) {
        let grams = self.to_grams(raw);
        self.raw_weight_g = grams;

        let admitted = self.guard.offer(grams).samples();
        if admitted.is_empty() {
            return;
        }
        for sample in admitted {
            self.weight_g = self.weight_filter.update(sample);
        }
        self.update_flow(now_ms, shot_active);
    }

    fn update_flow(&mut self, now_ms: u64, shot_active: bool) {
        if !shot_active {
            if !self.flow_reset_done {
                // Once per idle period, so the estimate error does not shrink
                // towards zero while nothing is flowing.
                self.flow_g_per_s = 0.0;
                self.flow_filter.reset();
                self.flow_reset_done = true;
            }
            return;
        }

        let dt_ms = now_ms.saturating_sub(self.prev_flow_ms);
        let raw_flow = if dt_ms > 0 {
            ((self.weight_g - self.prev_flow_weight) / dt_ms as f32 * 1000.0).max(0.0)
        } else {
            0.0
        };
        self.flow_reset_done = false;
        self.flow_g_per_s = self.flow_filter.update(raw_flow);
        self.prev_flow_ms = now_ms;
        self.prev_flow_weight = self.weight_g;
    }

    /// Forget everything learned since the last tare.
    pub fn reset(&mut self, now_ms: u64) {
        self.weight_filter.reset();
        self.flow_filter.reset();
        self.guard.reset();
        self.weight_g = 0.0;
        self.raw_weight_g = 0.0;
        self.flow_g_per_s = 0.0;
        self.prev_flow_weight = 0.0;
        self.prev_flow_ms = now_ms;
    }

    pub fn set_calibration(&mut self, offset: i32, scale: f32) {
        self.offset = offset;
        self.scale = scale;
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn retune(&mut self, weight: KalmanParams, flow: KalmanParams) {
        if self.weight_filter.params() != weight {
            self.weight_filter.retune(weight);
        }
        if self.flow_filter.params() != flow {
            self.flow_filter.retune(flow);
        }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn weight(&self) -> f32 {
        self.weight_g
    }

    pub fn raw_weight(&self) -> f32 {
        self.raw_weight_g
    }

    pub fn flow_rate(&self) -> f32 {
        self.flow_g_per_s
    }

    pub fn pending_spike(&self) -> Option<f32> {
        self.guard.pending()
    }
}
