//! Safety supervisor.
//!
//! The supervisor runs **every tick before the FSM** and keeps a fault
//! bitmask in `FsmContext.fault_flags`.  Any set bit is a critical sensor
//! failure: the service forces ERROR (every actuator off) and the ERROR
//! handler returns to HEATING once the mask is empty again.
//!
//! ## Fault lifecycle
//!
//! 1. A condition triggers a fault (e.g. boiler thermistor open).
//! 2. The supervisor sets the corresponding bit and records a
//!    human-readable `last_error`.
//! 3. The service forces the FSM into `Error`.
//! 4. Each tick the supervisor re-evaluates; cleared conditions unset
//!    their bit.  `last_error` is kept for the operator.
//!
//! Several faults may be active at once; the machine stays in `Error`
//! until *every* one is resolved.

use core::fmt::Write as _;

use crate::error::SafetyFault;
use crate::fsm::context::SensorSnapshot;
use crate::sensors::lut::ADC_FULL_SCALE_CODE;
use log::{error, info};

/// Codes within this distance of either rail mean an open or shorted
/// thermistor.
pub const ADC_RAILED_THRESHOLD: i32 = 500;

/// Absolute boiler ceiling (°C), independent of any heater logic.
pub const MAX_SAFE_BOILER_C: f32 = 150.0;

fn railed(code: i32) -> bool {
    !(ADC_RAILED_THRESHOLD..=ADC_FULL_SCALE_CODE - ADC_RAILED_THRESHOLD).contains(&code)
}

/// Whether `fault` is present in `snap`.
pub fn fault_active(fault: SafetyFault, snap: &SensorSnapshot) -> bool {
    match fault {
        SafetyFault::BoilerSensorRailed => railed(snap.boiler_code),
        SafetyFault::HxSensorRailed => railed(snap.hx_code),
        SafetyFault::LevelProbeStuckHigh => snap.level_probe_stuck_high,
        SafetyFault::BoilerOverTemp => snap.boiler_temp_c > MAX_SAFE_BOILER_C,
    }
}

/// First critical failure in evaluation order, if any.
pub fn first_fault(snap: &SensorSnapshot) -> Option<SafetyFault> {
    SafetyFault::ALL
        .into_iter()
        .find(|&f| fault_active(f, snap))
}

/// Safety supervisor.
#[derive(Debug, Default)]
pub struct SafetySupervisor {
    /// Latched fault bitmask.
    faults: u8,
    last_error: heapless::String<96>,
}

impl SafetySupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate all conditions against the latest snapshot.
    /// Returns the updated fault bitmask.
    pub fn evaluate(&mut self, snap: &SensorSnapshot) -> u8 {
        // Reverse order so the message of the first active fault wins.
        for fault in SafetyFault::ALL.into_iter().rev() {
            let active = fault_active(fault, snap);
            self.eval_fault(fault, active);
            if active {
                self.describe(fault, snap);
            }
        }
        self.faults
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    /// Check if a specific fault is active.
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    /// Most recent failure description; empty if none was ever seen.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: SafetyFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("SAFETY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }

    fn describe(&mut self, fault: SafetyFault, snap: &SensorSnapshot) {
        self.last_error.clear();
        // Truncation on overflow is acceptable for a status string.
        let _ = match fault {
            SafetyFault::BoilerSensorRailed => write!(
                self.last_error,
                "Boiler sensor disconnected/shorted. ADC: {}",
                snap.boiler_code
            ),
            SafetyFault::HxSensorRailed => write!(
                self.last_error,
                "HX sensor disconnected/shorted. ADC: {}",
                snap.hx_code
            ),
            SafetyFault::LevelProbeStuckHigh => {
                write!(self.last_error, "Level probe pin high while probe disabled")
            }
            SafetyFault::BoilerOverTemp => write!(
                self.last_error,
                "Boiler temperature unsafe: {:.1} C",
                snap.boiler_temp_c
            ),
        };
    }
}
