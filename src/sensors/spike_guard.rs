//! One-sample-deep outlier hold for the load cell.
//!
//! A reading that jumps more than the threshold away from the last
//! accepted sample is parked as *pending*.  The next reading decides:
//!
//! | next reading close to | outcome                                   |
//! |-----------------------|-------------------------------------------|
//! | pending               | accept pending, then the new reading      |
//! | last accepted         | discard pending, accept the new reading   |
//! | neither               | new reading replaces pending, keep waiting|

/// Default jump threshold in grams.
pub const SPIKE_THRESHOLD_G: f32 = 25.0;

/// What the guard lets through for one offered sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Nothing accepted yet; the sample is pending.
    Held,
    /// A single sample accepted.
    One(f32),
    /// The pending sample was confirmed; both go to the filter in order.
    Pair(f32, f32),
}

impl Admission {
    /// Accepted samples, oldest first.
    pub fn samples(&self) -> heapless::Vec<f32, 2> {
        let mut out = heapless::Vec::new();
        match *self {
            Self::Held => {}
            Self::One(a) => {
                let _ = out.push(a);
            }
            Self::Pair(a, b) => {
                let _ = out.push(a);
                let _ = out.push(b);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct SpikeGuard {
    threshold: f32,
    last_accepted: Option<f32>,
    pending: Option<f32>,
}

impl SpikeGuard {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_accepted: None,
            pending: None,
        }
    }

    pub fn offer(&mut self, sample: f32) -> Admission {
        let Some(last) = self.last_accepted else {
            self.accept(sample);
            return Admission::One(sample);
        };

        if let Some(pending) = self.pending {
            if (sample - pending).abs() < self.threshold {
                self.accept(sample);
                return Admission::Pair(pending, sample);
            }
            if (sample - last).abs() < self.threshold {
                self.accept(sample);
                return Admission::One(sample);
            }
            self.pending = Some(sample);
            return Admission::Held;
        }

        if (sample - last).abs() < self.threshold {
            self.accept(sample);
            Admission::One(sample)
        } else {
            self.pending = Some(sample);
            Admission::Held
        }
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.pending = None;
    }

    pub fn pending(&self) -> Option<f32> {
        self.pending
    }

    pub fn last_accepted(&self) -> Option<f32> {
        self.last_accepted
    }

    fn accept(&mut self, sample: f32) {
        self.last_accepted = Some(sample);
        self.pending = None;
    }
}

impl Default for SpikeGuard {
    fn default() -> Self {
        Self::new(SPIKE_THRESHOLD_G)
    }
}
