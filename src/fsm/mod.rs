//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────────┬───────────┬──────────┬───────────────────┐ │
//! │  │ StateId         │ on_enter  │ on_exit  │ on_update         │ │
//! │  ├─────────────────┼───────────┼──────────┼───────────────────┤ │
//! │  │ WaterEmpty      │ fn(ctx)   │ -        │ fn(ctx)->Option<> │ │
//! │  │ BoilerEmpty     │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  │ Heating         │ fn(ctx)   │ -        │ fn(ctx)->Option<> │ │
//! │  │ ...             │           │          │                   │ │
//! │  │ CalibrationTest │ fn(ctx)   │ -        │ fn(ctx)->Option<> │ │
//! │  └─────────────────┴───────────┴──────────┴───────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine first runs the supervisory checks (sensor
//! failure, empty reservoir, empty boiler), which may pre-empt the current
//! state, then calls `on_update` for the **current** state.  If it returns
//! `Some(next_id)`, the engine runs the shared transition hook, `on_exit`
//! for the current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext` which holds
//! sensor readings, controllers, config, and timing.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all possible machine states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    WaterEmpty = 0,
    BoilerEmpty = 1,
    Heating = 2,
    Brewing = 3,
    Standby = 4,
    Idle = 5,
    CleaningStart = 6,
    CleaningPumping = 7,
    CleaningPause = 8,
    SteamBoost = 9,
    CoolingFlush = 10,
    Error = 11,
    Debug = 12,
    Init = 13,
    CalibrationEmpty = 14,
    CalibrationTestWeight = 15,
}

impl StateId {
    /// Total number of states: used to size the table array.
    pub const COUNT: usize = 16;

    pub const ALL: [Self; Self::COUNT] = [
        Self::WaterEmpty,
        Self::BoilerEmpty,
        Self::Heating,
        Self::Brewing,
        Self::Standby,
        Self::Idle,
        Self::CleaningStart,
        Self::CleaningPumping,
        Self::CleaningPause,
        Self::SteamBoost,
        Self::CoolingFlush,
        Self::Error,
        Self::Debug,
        Self::Init,
        Self::CalibrationEmpty,
        Self::CalibrationTestWeight,
    ];

    /// Convert a `u8` index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Error` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match Self::ALL.get(idx) {
            Some(&id) => id,
            None => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }

    /// Name published to collaborators.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaterEmpty => "WATER_EMPTY",
            Self::BoilerEmpty => "BOILER_EMPTY",
            Self::Heating => "HEATING",
            Self::Brewing => "BREWING",
            Self::Standby => "STANDBY",
            Self::Idle => "IDLE",
            Self::CleaningStart => "CLEANING_START",
            Self::CleaningPumping => "CLEANING_PUMPING",
            Self::CleaningPause => "CLEANING_PAUSE",
            Self::SteamBoost => "STEAM_BOOST",
            Self::CoolingFlush => "COOLING_FLUSH",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
            Self::Init => "INIT",
            Self::CalibrationEmpty => "CALIBRATION_EMPTY",
            Self::CalibrationTestWeight => "CALIBRATION_TEST_WEIGHT",
        }
    }

    pub fn is_cleaning(self) -> bool {
        matches!(
            self,
            Self::CleaningStart | Self::CleaningPumping | Self::CleaningPause
        )
    }

    pub fn is_calibrating(self) -> bool {
        matches!(self, Self::CalibrationEmpty | Self::CalibrationTestWeight)
    }
}

impl core::fmt::Display for StateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and threads a
/// mutable [`FsmContext`] through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter (wraps at u64::MAX).
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state = self.current_state();
        ctx.previous_state = ctx.state;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Run the supervisory checks; a pre-empting state is entered first.
    /// 2. Call `on_update` for the current state.
    /// 3. If it returns `Some(next)`, execute the transition:
    ///    hook → `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;
        ctx.state = self.current_state();

        if let Some(next_id) = states::preempt(ctx) {
            self.force_transition(next_id, ctx);
        }

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.force_transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (used by commands and the safety
    /// path).  Transitions to the current state are ignored.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let from = self.current_state();
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        states::on_transition(ctx, from, next_id);

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer and timing
        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;
        ctx.state = next_id;

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
