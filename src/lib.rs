//! Espresso machine controller library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod calibration;
pub mod config;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod profile;
pub mod safety;

// Hardware-facing modules compile on the host against the simulated
// pin bank; the target implementations are cfg-gated inside.
pub mod adapters;
pub mod control;
pub mod drivers;
pub mod sensors;
