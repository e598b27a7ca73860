//! LM1830 boiler level probe.
//!
//! The probe is only energised for a short measurement window: enabling
//! it permanently would electrolyse the probe.  A measurement is
//!
//! ```text
//!   sample pin (must be LOW) ─▶ enable probe ─▶ wait 500 ms ─▶ read ─▶ disable
//! ```
//!
//! and runs every 3 s while the pump is idle.  Two consecutive empty
//! readings declare the boiler empty; one full reading clears it.

use log::{debug, warn};

use crate::app::ports::{ActuatorPort, ClockPort, SensorPort};
use crate::pins::InputPin;

/// Interval between periodic measurements.
pub const LEVEL_CHECK_INTERVAL_MS: u64 = 3000;

/// Probe settling time before the output is trusted.
pub const PROBE_SETTLE_MS: u64 = 500;

/// Outcome of the probe IC self test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSelfTest {
    /// Output low while disabled, high once enabled.
    Ok,
    /// Output already high while disabled.
    Fault,
    /// Output never went high.
    NoResponse,
}

impl ProbeSelfTest {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fault => "FAULT (pin high while disabled)",
            Self::NoResponse => "NO RESPONSE",
        }
    }
}

/// Non-blocking periodic level measurement.
#[derive(Debug, Clone, Default)]
pub struct BoilerLevelMonitor {
    probe_enabled: bool,
    enabled_at_ms: u64,
    last_check_ms: u64,
    previous_empty: bool,
    empty: bool,
    stuck_high: bool,
}

impl BoilerLevelMonitor {
    pub fn new(initially_empty: bool) -> Self {
        Self {
            empty: initially_empty,
            ..Self::default()
        }
    }

    /// Advance the measurement cycle.
    ///
    /// `level_pin_high` is the current probe output, `inhibited` suspends
    /// new measurements (DEBUG).  A measurement in progress is abandoned
    /// as soon as the pump runs, since pump current disturbs the probe.
    pub fn poll(&mut self, now_ms: u64, level_pin_high: bool, pump_running: bool, inhibited: bool) {
        if pump_running {
            if self.probe_enabled {
                debug!("Level probe measurement abandoned: pump running");
            }
            self.probe_enabled = false;
            return;
        }
        if inhibited {
            return;
        }

        if !self.probe_enabled {
            if now_ms.saturating_sub(self.last_check_ms) > LEVEL_CHECK_INTERVAL_MS {
                // The output must be low before the probe is powered.
                self.stuck_high = level_pin_high;
                if self.stuck_high {
                    warn!("Level probe output high while disabled");
                }
                self.probe_enabled = true;
                self.enabled_at_ms = now_ms;
                self.last_check_ms = now_ms;
            }
            return;
        }

        if now_ms.saturating_sub(self.enabled_at_ms) > PROBE_SETTLE_MS {
            let reading_empty = !level_pin_high;
            if reading_empty && self.previous_empty {
                if !self.empty {
                    warn!("Boiler level low");
                }
                self.empty = true;
            } else if !reading_empty {
                self.empty = false;
            }
            self.previous_empty = reading_empty;
            self.probe_enabled = false;
        }
    }

    /// Whether the monitor currently wants the probe powered.
    pub fn probe_enabled(&self) -> bool {
        self.probe_enabled
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Level IC output was high at the start of the last measurement.
    pub fn stuck_high(&self) -> bool {
        self.stuck_high
    }

    /// The fill cycle saw a sustained full reading.
    pub fn mark_full(&mut self) {
        self.empty = false;
        self.previous_empty = false;
    }
}

/// Blocking one-shot level read used at boot.  Returns `true` when water
/// touches the probe.  Never measures while the pump runs.
pub fn detect_at_boot<H>(hw: &mut H, pump_running: bool) -> bool
where
    H: SensorPort + ActuatorPort + ClockPort,
{
    if pump_running {
        return false;
    }
    hw.set_level_probe(true);
    hw.delay_ms(PROBE_SETTLE_MS as u32);
    let water = hw.read_pin(InputPin::BoilerLevel);
    hw.set_level_probe(false);
    water
}

/// Blocking probe IC self test (DEBUG `checkic`).
pub fn self_test<H>(hw: &mut H) -> ProbeSelfTest
where
    H: SensorPort + ActuatorPort + ClockPort,
{
    hw.set_level_probe(false);
    hw.delay_ms(PROBE_SETTLE_MS as u32);
    let before = hw.read_pin(InputPin::BoilerLevel);
    hw.set_level_probe(true);
    hw.delay_ms(PROBE_SETTLE_MS as u32);
    let after = hw.read_pin(InputPin::BoilerLevel);
    hw.set_level_probe(false);

    if before {
        ProbeSelfTest::Fault
    } else if after {
        ProbeSelfTest::Ok
    } else {
        ProbeSelfTest::NoResponse
    }
}
