//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It contains the latest sensor snapshot, actuator command
//! outputs, the heater and pump controllers, per-state timers,
//! configuration, and accumulated safety faults.  Think of it as the
//! "blackboard" in a blackboard architecture.

use crate::calibration::CalibrationContext;
use crate::config::SystemConfig;
use crate::control::heater::HeaterInputs;
use crate::control::{HeaterController, HeaterRole, PumpController, ShotProgress};
use crate::profile::ShotCursor;

use super::StateId;

/// Most transitions one service tick can record (preemption + handler +
/// command-driven jumps).
pub const MAX_TRANSITIONS_PER_TICK: usize = 8;

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by sensor hub)
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of every sensor in the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    /// Smoothed boiler temperature (°C).
    pub boiler_temp_c: f32,
    /// Smoothed heat-exchanger temperature (°C).
    pub hx_temp_c: f32,
    /// Smoothed brew pressure (bar).
    pub pressure_bar: f32,

    /// Kalman-filtered weight (g).
    pub weight_g: f32,
    /// Unfiltered weight of the last accepted conversion (g).
    pub raw_weight_g: f32,
    /// Filtered flow rate (g/s), zero outside a shot.
    pub flow_g_per_s: f32,

    /// Raw ADS1115 codes.
    pub boiler_code: i32,
    pub hx_code: i32,
    pub pressure_code: i32,
    /// Last raw ADS1232 conversion.
    pub scale_raw: i32,

    /// Debounced result of the periodic level measurement.
    pub boiler_empty: bool,
    /// Instantaneous level-probe output (`true` = water at the probe).
    pub boiler_water_detected: bool,
    /// Level-probe IC reported water while powered down.
    pub level_probe_stuck_high: bool,
}

/// Digital inputs after debouncing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebouncedInputs {
    pub lever_lifted: bool,
    /// Reservoir empty.
    pub water_tripped: bool,
    /// Three-way temperature switch, position 1 / position 2.
    pub three_way_1: bool,
    pub three_way_2: bool,
    /// Two-way switch in the steam position.
    pub steam_selected: bool,
    /// The debounced lever state flipped this poll.
    pub lever_changed: bool,
    pub water_changed: bool,
}

// ---------------------------------------------------------------------------
// Actuator commands (written by state handlers; consumed by the service)
// ---------------------------------------------------------------------------

/// Front-panel pattern requested by the active state.  The indicator
/// engine turns it into LED and buzzer levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indication {
    /// Leave the panel as it is.
    #[default]
    Hold,
    /// All LEDs and the buzzer toggle every 500 ms.
    Error,
    /// Main LED on, water LED blinking, double-beep every four seconds.
    WaterEmpty,
    /// Main and water LEDs on, heater LED blinking.
    Heating,
    /// All LEDs on.
    Ready,
    /// Short main-LED flash every five seconds.
    Standby,
    /// LEDs follow [`ActuatorCommands::leds`] (DEBUG).
    Manual,
}

/// Direct LED levels, used when the panel is under manual control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedLevels {
    pub main: bool,
    pub heater: bool,
    pub water: bool,
}

/// Commands that state handlers write to request actuator actions.
/// The service applies these to the hardware after each FSM tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommands {
    /// Heater SSR (already PWM-modulated).
    pub heater: bool,
    pub pump: bool,
    /// Pump dimmer level (0–100 %).
    pub pump_power: f32,
    pub fill_valve: bool,
    /// Level probe requested by the state (ORed with the periodic check).
    pub level_probe: bool,
    /// One-shot beeps; patterns come from `indication`.
    pub buzzer: bool,
    pub indication: Indication,
    pub leds: LedLevels,
}

impl Default for ActuatorCommands {
    fn default() -> Self {
        Self {
            heater: false,
            pump: false,
            pump_power: 100.0,
            fill_valve: false,
            level_probe: false,
            buzzer: false,
            indication: Indication::Hold,
            leds: LedLevels::default(),
        }
    }
}

impl ActuatorCommands {
    /// All actuators off: safe default.
    pub fn all_off() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Per-state bookkeeping
// ---------------------------------------------------------------------------

/// Buzzer cue at the end of a cleaning pump run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleaningBeep {
    #[default]
    Waiting,
    First { since_ms: u64 },
    Pause { since_ms: u64 },
    Second { since_ms: u64 },
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CleaningCycle {
    /// Completed repetitions.
    pub count: u8,
    /// Cleaning state to return to after a water refill; `None` means the
    /// normal refill path (HEATING).
    pub resume: Option<StateId>,
    pub pump_start_ms: u64,
    pub beep: CleaningBeep,
}

/// State-entry timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTimers {
    pub idle_entry_ms: u64,
    pub flush_start_ms: u64,
    pub steam_boost_entry_ms: u64,
    pub shot_start_ms: u64,
    /// End of the last cooling flush; `None` if none ran yet.
    pub cooling_flush_end_ms: Option<u64>,
    /// First tick of the current continuous "boiler full" reading.
    pub boiler_full_since_ms: Option<u64>,
    pub last_transition_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Monotonic time of the current tick (ms).
    pub now_ms: u64,
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    /// Monotonic total tick count.
    pub total_ticks: u64,

    // -- State tracking --
    /// Mirror of the engine's current state, kept for shared helpers.
    pub state: StateId,
    pub previous_state: StateId,
    /// Transitions taken since the service last drained the list.
    pub transitions: heapless::Vec<(StateId, StateId), MAX_TRANSITIONS_PER_TICK>,

    // -- Sensor data --
    /// Latest sensor readings.  Updated before each FSM tick.
    pub sensors: SensorSnapshot,
    pub inputs: DebouncedInputs,

    // -- Actuator outputs --
    /// Commands to be applied to actuators after the FSM tick.
    pub commands: ActuatorCommands,
    /// One-shot beep end time.
    pub beep_until_ms: Option<u64>,

    // -- Controllers --
    pub heater: HeaterController,
    pub pump: PumpController,
    pub cursor: ShotCursor,

    // -- Configuration --
    /// System configuration (tunable parameters).
    pub config: SystemConfig,

    // -- Safety --
    /// Accumulated safety fault bitmask (see `SafetyFault::mask()`).
    /// Set by the safety supervisor, read by state handlers.
    pub fault_flags: u8,
    /// A supervisory check claimed the machine this tick; recovery
    /// transitions wait for a clean tick.
    pub preempted: bool,

    // -- Per-state --
    pub timers: StateTimers,
    /// End of a programmatic flush.
    pub flush_until_ms: Option<u64>,
    pub cleaning: CleaningCycle,
    pub standby_lever_lifted: bool,
    pub calibration: CalibrationContext,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            now_ms: 0,
            ticks_in_state: 0,
            total_ticks: 0,
            state: StateId::Init,
            previous_state: StateId::Init,
            transitions: heapless::Vec::new(),
            sensors: SensorSnapshot::default(),
            inputs: DebouncedInputs::default(),
            commands: ActuatorCommands::all_off(),
            beep_until_ms: None,
            heater: HeaterController::new(config.heater_gains, config.brew_temp_c, 0),
            pump: PumpController::new(&config),
            cursor: ShotCursor::new(),
            config,
            fault_flags: 0,
            preempted: false,
            timers: StateTimers::default(),
            flush_until_ms: None,
            cleaning: CleaningCycle::default(),
            standby_lever_lifted: false,
            calibration: CalibrationContext::default(),
        }
    }

    /// Returns `true` if **any** safety fault is active.
    pub fn has_faults(&self) -> bool {
        self.fault_flags != 0
    }

    /// Check whether a specific fault flag is set.
    pub fn has_fault(&self, fault: crate::error::SafetyFault) -> bool {
        self.fault_flags & fault.mask() != 0
    }

    /// Milliseconds since `since_ms`.
    pub fn elapsed_since(&self, since_ms: u64) -> u64 {
        self.now_ms.saturating_sub(since_ms)
    }

    pub fn coffee_mode(&self) -> bool {
        self.config.brew_mode.is_coffee()
    }

    // -- Actuator helpers --

    /// Heater, pump and fill valve off; both pump loops parked at zero.
    pub fn all_stop(&mut self) {
        self.commands.fill_valve = false;
        self.commands.pump = false;
        self.commands.heater = false;
        self.pump.stop();
    }

    pub fn pump_and_valve_off(&mut self) {
        self.commands.pump = false;
        self.commands.fill_valve = false;
    }

    /// Sound the buzzer for `duration_ms`.
    pub fn beep(&mut self, duration_ms: u64) {
        self.commands.buzzer = true;
        self.beep_until_ms = Some(self.now_ms + duration_ms);
    }

    pub fn silence(&mut self) {
        self.commands.buzzer = false;
        self.beep_until_ms = None;
    }

    /// Run the heater decision for the current state.  Returns `true` when
    /// the coffee setpoint moved and the loop was re-armed.
    pub fn run_heater(&mut self) -> bool {
        let role = match self.state {
            StateId::Heating
            | StateId::Idle
            | StateId::CoolingFlush
            | StateId::CleaningStart
            | StateId::CleaningPumping
            | StateId::CleaningPause
            | StateId::CalibrationEmpty
            | StateId::CalibrationTestWeight
            | StateId::Debug => HeaterRole::Regulate,
            StateId::Brewing | StateId::SteamBoost => HeaterRole::FullPower,
            _ => HeaterRole::Off,
        };
        let inputs = HeaterInputs {
            role,
            boiler_c: self.sensors.boiler_temp_c,
            hx_c: self.sensors.hx_temp_c,
            heating: self.state == StateId::Heating,
        };
        let decision = self.heater.run(&self.config, inputs, self.now_ms);
        self.commands.heater = decision.heater_on;
        decision.setpoint_changed
    }

    /// Drive the pump from the active profiling mode.
    pub fn run_pump_profile(&mut self) {
        let progress = ShotProgress {
            elapsed_ms: self.elapsed_since(self.timers.shot_start_ms),
            weight_g: self.sensors.weight_g,
            pressure_bar: self.sensors.pressure_bar,
            flow_g_per_s: self.sensors.flow_g_per_s,
        };
        let demand = self
            .pump
            .run(&self.config, &mut self.cursor, progress, self.now_ms);
        self.commands.pump = demand.run;
        self.commands.pump_power = demand.power_pct;
    }

    /// Whether a programmatic flush is running.  Clears it once it ran out.
    pub fn flush_active(&mut self) -> bool {
        match self.flush_until_ms {
            Some(until) if self.now_ms >= until => {
                self.flush_until_ms = None;
                log::info!("Programmatic flush finished");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Steam after a shot, or straight back to the mode's resting state.
    pub fn resting_state(&self) -> StateId {
        if self.coffee_mode() {
            StateId::Heating
        } else {
            StateId::Idle
        }
    }
}
