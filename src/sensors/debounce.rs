//! Time-based debounce for level-sensed digital inputs.
//!
//! No delays: the raw level is sampled every tick and a change is
//! committed only once the raw level has held still for the interval.

/// Brew lever and water detector debounce interval.
pub const DEBOUNCE_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct Debouncer {
    interval_ms: u64,
    last_raw: bool,
    raw_changed_ms: u64,
    confirmed: bool,
    confirmed_ms: Option<u64>,
}

impl Debouncer {
    pub fn new(initial: bool, interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_raw: initial,
            raw_changed_ms: 0,
            confirmed: initial,
            confirmed_ms: None,
        }
    }

    /// Feed one raw sample.  Returns the new logical value when a change
    /// is committed on this call.
    pub fn update(&mut self, raw: bool, now_ms: u64) -> Option<bool> {
        if raw != self.last_raw {
            self.raw_changed_ms = now_ms;
            self.last_raw = raw;
        }

        let settled = now_ms.saturating_sub(self.raw_changed_ms) > self.interval_ms;
        if settled && raw != self.confirmed {
            self.confirmed = raw;
            self.confirmed_ms = Some(now_ms);
            return Some(raw);
        }
        None
    }

    pub fn value(&self) -> bool {
        self.confirmed
    }

    /// When the logical value last changed, if ever.
    pub fn changed_at(&self) -> Option<u64> {
        self.confirmed_ms
    }
}
