//! Fixed-sample-time PID controller.
//!
//! Classic discrete form: the integral gain is folded into the running
//! output sum (so retuning never bumps the output), and the derivative
//! acts on the measurement rather than the error (no kick on setpoint
//! changes).  In [`Mode::Manual`] the loop is frozen at a caller-set
//! output and the integrator does not move.

use crate::config::PidGains;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Automatic,
}

/// Individual contributions from the last computation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

/// PID controller
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    // Gains scaled by the sample time.
    ki_scaled: f32,
    kd_scaled: f32,
    sample_ms: u64,
    output_min: f32,
    output_max: f32,
    mode: Mode,
    setpoint: f32,
    input: f32,
    output: f32,
    output_sum: f32,
    last_input: f32,
    last_run_ms: Option<u64>,
    terms: PidTerms,
}

impl PidController {
    pub fn new(gains: PidGains, sample_ms: u64, output_min: f32, output_max: f32) -> Self {
        let mut pid = Self {
            gains,
            ki_scaled: 0.0,
            kd_scaled: 0.0,
            sample_ms: sample_ms.max(1),
            output_min,
            output_max,
            mode: Mode::Automatic,
            setpoint: 0.0,
            input: 0.0,
            output: 0.0,
            output_sum: 0.0,
            last_input: 0.0,
            last_run_ms: None,
            terms: PidTerms::default(),
        };
        pid.set_tunings(gains);
        pid
    }

    /// Run one step if the sample interval has elapsed.
    ///
    /// Returns the new output when a computation happened, `None` when the
    /// loop is in manual or called too early.  The measured `input` is
    /// remembered either way so a later switch to automatic starts from it.
    pub fn compute(&mut self, input: f32, now_ms: u64) -> Option<f32> {
        self.input = input;
        if self.mode == Mode::Manual {
            return None;
        }
        if let Some(last) = self.last_run_ms {
            if now_ms.saturating_sub(last) < self.sample_ms {
                return None;
            }
        }

        let error = self.setpoint - input;
        let d_input = input - self.last_input;

        self.output_sum = (self.output_sum + self.ki_scaled * error)
            .clamp(self.output_min, self.output_max);

        let p = self.gains.kp * error;
        let d = -self.kd_scaled * d_input;
        self.output = (p + self.output_sum + d).clamp(self.output_min, self.output_max);
        self.terms = PidTerms {
            p,
            i: self.output_sum,
            d,
        };

        self.last_input = input;
        self.last_run_ms = Some(now_ms);
        Some(self.output)
    }

    /// Hot-swap gains.  The accumulated output sum is kept.
    pub fn set_tunings(&mut self, gains: PidGains) {
        if gains.kp < 0.0 || gains.ki < 0.0 || gains.kd < 0.0 {
            return;
        }
        let sample_s = self.sample_ms as f32 / 1000.0;
        self.gains = gains;
        self.ki_scaled = gains.ki * sample_s;
        self.kd_scaled = gains.kd / sample_s;
    }

    /// Retune only when `gains` differ from the active ones.
    pub fn retune_if_changed(&mut self, gains: PidGains) -> bool {
        if self.gains == gains {
            return false;
        }
        self.set_tunings(gains);
        true
    }

    pub fn set_sample_time(&mut self, sample_ms: u64) {
        if sample_ms == 0 {
            return;
        }
        let ratio = sample_ms as f32 / self.sample_ms as f32;
        self.ki_scaled *= ratio;
        self.kd_scaled /= ratio;
        self.sample_ms = sample_ms;
    }

    pub fn set_output_limits(&mut self, min: f32, max: f32) {
        if min >= max {
            return;
        }
        self.output_min = min;
        self.output_max = max;
        if self.mode == Mode::Automatic {
            self.output = self.output.clamp(min, max);
            self.output_sum = self.output_sum.clamp(min, max);
        }
    }

    /// Switch mode.  Manual → automatic re-initialises the integrator from
    /// the current output so the transfer is bumpless.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Automatic && self.mode == Mode::Manual {
            self.initialize();
        }
        self.mode = mode;
    }

    /// Cycle through manual so the next computation starts from a clean
    /// integrator.
    pub fn reinitialize(&mut self) {
        self.set_mode(Mode::Manual);
        self.set_mode(Mode::Automatic);
    }

    /// Force the output while in manual.  Ignored in automatic.
    pub fn set_output(&mut self, value: f32) {
        if self.mode == Mode::Manual {
            self.output = value;
        }
    }

    /// Record the measurement without computing.
    pub fn set_input(&mut self, input: f32) {
        self.input = input;
    }

    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
    }

    fn initialize(&mut self) {
        self.output_sum = self.output.clamp(self.output_min, self.output_max);
        self.last_input = self.input;
        self.last_run_ms = None;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn input(&self) -> f32 {
        self.input
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn terms(&self) -> PidTerms {
        self.terms
    }

    pub fn integrator(&self) -> f32 {
        self.output_sum
    }
}
