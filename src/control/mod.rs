//! Closed-loop controllers: the generic PID plus the heater and pump
//! loops built on it.

pub mod heater;
pub mod pid;
pub mod pump;

pub use heater::{HeaterController, HeaterDecision, HeaterInputs, HeaterRole};
pub use pid::{Mode, PidController};
pub use pump::{PumpController, PumpDemand, ShotProgress};
