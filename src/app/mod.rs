//! Application core: domain orchestration, no direct I/O.
//!
//! Business rules for the espresso machine live here: the service that
//! ties sensor fusion, safety, the FSM and the control loops together,
//! the command and setting tables, and the outbound events.  Hardware is
//! only reached through the **port traits** in [`ports`], so this layer
//! runs unchanged against the mocks in `tests/`.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
