//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, the sensor hub, the safety supervisor and
//! the shared context.  All I/O flows through the port traits, passed in
//! at each call, so the whole service runs against mock adapters.
//!
//! ```text
//!  SensorPort ─┐   ┌──────────────────────────────┐ ──▶ EventSink
//!  ScalePort  ─┼─▶ │          AppService          │
//!  ClockPort  ─┘   │ hub · safety · FSM · panel   │
//! ActuatorPort ◀── └──────────────────────────────┘ ◀── ConfigPort
//! ```
//!
//! One [`tick`](AppService::tick) runs to completion: inputs → readings →
//! scale → level probe → switches → safety → FSM → actuators → events.
//! Blocking scale work only happens inside
//! [`with_maintenance`](AppService::with_maintenance).

use log::{debug, error, info, warn};

use crate::calibration::{self, CalibrationOutcome, STABLE_READINGS};
use crate::config::{BrewMode, SystemConfig};
use crate::drivers::indicators::IndicatorEngine;
use crate::error::{CommandError, Error, Result, SensorError};
use crate::fsm::context::{CleaningCycle, DebouncedInputs, FsmContext, SensorSnapshot};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::pins::AdcChannel;
use crate::safety::SafetySupervisor;
use crate::sensors::lut::{ADC_FULL_SCALE_CODE, ADC_FULL_SCALE_V};
use crate::sensors::{ReadGate, SensorHub, boiler_level, pressure};

use super::commands::{self, AppCommand, SettingAction};
use super::events::{AppEvent, RawReadings, TelemetryData};
use super::ports::{ActuatorPort, ConfigPort, EventSink, Led, MachineIo};

/// Periodic telemetry interval.
pub const TELEMETRY_INTERVAL_MS: u64 = 1000;

/// Settings changes are written this long after the first unsaved edit.
pub const AUTO_SAVE_DELAY_MS: u64 = 5000;

/// Cleaning from HEATING needs the group at least this hot.
pub const CLEANING_MIN_HX_C: f32 = 80.0;

/// `readweight` polls for a conversion this many times, 2 ms apart.
const READ_WEIGHT_ATTEMPTS: u32 = 200;
const READ_WEIGHT_POLL_MS: u32 = 2;

/// Switch-selected setpoints closer than this are treated as unchanged.
const SETPOINT_EPSILON_C: f32 = 0.1;

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    hub: SensorHub,
    safety: SafetySupervisor,
    panel: IndicatorEngine,
    /// Pump level last written to the relay.
    pump_on: bool,
    pump_changed_ms: Option<u64>,
    last_brew_mode: BrewMode,
    last_telemetry_ms: u64,
    /// `rawdata on`: stream converter codes with the telemetry.
    raw_stream: bool,
    tick_count: u64,
    config_dirty: bool,
    dirty_since_ms: u64,
    /// Skip the auto-save delay on the next check.
    save_now: bool,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** touch hardware: call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        let hub = SensorHub::new(&config);
        let last_brew_mode = config.brew_mode;
        let ctx = FsmContext::new(config);
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Init),
            ctx,
            hub,
            safety: SafetySupervisor::new(),
            panel: IndicatorEngine::new(),
            pump_on: false,
            pump_changed_ms: None,
            last_brew_mode,
            last_telemetry_ms: 0,
            raw_stream: false,
            tick_count: 0,
            config_dirty: false,
            dirty_since_ms: 0,
            save_now: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring the machine up and pick the boot state.
    ///
    /// Brew lever held → DEBUG; critical sensor failure → ERROR; empty
    /// reservoir → WATER_EMPTY; dry boiler → BOILER_EMPTY; else INIT.
    pub fn start<H: MachineIo>(&mut self, hw: &mut H, sink: &mut impl EventSink) -> StateId {
        hw.all_off();
        hw.configure();
        self.ctx.now_ms = hw.now_ms();

        let inputs = self.hub.seed_inputs(hw);
        self.follow_switches(inputs);
        self.hub.warm_up(hw);
        let boiler_has_water = self.hub.detect_boiler_level(hw, false);

        let boot = if inputs.lever_lifted {
            info!("Brew lever held at power-on, entering DEBUG");
            StateId::Debug
        } else if let Some(fault) = self.hub.critical_failure() {
            error!("Critical sensor failure at boot: {fault}");
            StateId::Error
        } else if inputs.water_tripped {
            StateId::WaterEmpty
        } else if !boiler_has_water {
            StateId::BoilerEmpty
        } else {
            StateId::Init
        };

        self.ctx.now_ms = hw.now_ms();
        self.ctx.sensors = self.hub.snapshot();
        self.ctx.inputs = inputs;
        self.ctx.fault_flags = self.safety.evaluate(&self.ctx.sensors);
        self.last_telemetry_ms = self.ctx.now_ms;

        self.fsm = Fsm::new(build_state_table(), boot);
        self.fsm.start(&mut self.ctx);
        self.apply_actuators(hw);

        sink.emit(&AppEvent::Started(boot));
        info!(
            "AppService started in {boot} ({} mode, brew {:.1} C)",
            self.ctx.config.brew_mode.as_str(),
            self.ctx.config.brew_temp_c
        );
        boot
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    pub fn tick<H: MachineIo>(&mut self, hw: &mut H, sink: &mut impl EventSink) {
        self.tick_count += 1;
        let now = hw.now_ms();
        self.ctx.now_ms = now;

        if self.ctx.beep_until_ms.is_some_and(|until| now >= until) {
            self.ctx.silence();
        }

        // 1. Inputs and readings
        let state = self.fsm.current_state();
        let inputs = self.hub.poll_inputs(hw, now);
        if inputs.lever_changed
            && !inputs.lever_lifted
            && matches!(state, StateId::Brewing | StateId::Heating | StateId::CoolingFlush)
        {
            self.hub.mark_shot_end(now);
        }
        let gate = ReadGate {
            last_transition_ms: self.ctx.timers.last_transition_ms,
            pump_changed_ms: self.pump_changed_ms,
        };
        self.hub.update_readings(hw, now, gate);
        self.hub.handle_scale(hw, now);
        let level_inhibited = matches!(state, StateId::Debug | StateId::BoilerEmpty);
        self.hub.poll_level(hw, now, self.pump_on, level_inhibited);

        self.ctx.sensors = self.hub.snapshot();
        self.ctx.inputs = inputs;

        // 2. Front-panel switches
        if self.follow_switches(inputs) && state == StateId::Idle {
            self.fsm.force_transition(StateId::Heating, &mut self.ctx);
        }

        // 3. Safety evaluation
        self.update_faults(sink);

        // 4. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        // 5. Actuators and events
        self.apply_actuators(hw);
        self.drain_transitions(sink);

        if now.saturating_sub(self.last_telemetry_ms) >= TELEMETRY_INTERVAL_MS {
            self.last_telemetry_ms = now;
            self.publish_telemetry(sink);
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Parse and run one command line.
    pub fn handle_line<H: MachineIo>(
        &mut self,
        line: &str,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        let cmd = commands::parse_command(line)?;
        self.handle_command(cmd, hw, sink)
    }

    /// Run an operator command.  The reply is plain text for whatever
    /// shell forwarded it.
    pub fn handle_command<H: MachineIo>(
        &mut self,
        cmd: AppCommand,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        if cmd.debug_only() && self.state() != StateId::Debug {
            return Err(CommandError::DebugOnly.into());
        }
        self.ctx.now_ms = hw.now_ms();

        match cmd {
            AppCommand::Help => {
                let names: Vec<&str> = commands::command_names().collect();
                Ok(format!("Commands: {}", names.join(" ")))
            }
            AppCommand::Status => Ok(self.status_line()),
            AppCommand::LastError => Ok(match self.safety.last_error() {
                "" => "No critical error has been recorded.".to_string(),
                e => format!("Last error: {e}"),
            }),
            AppCommand::ToggleDebug => {
                let next = if self.state() == StateId::Debug {
                    StateId::Heating
                } else {
                    StateId::Debug
                };
                self.transition_to(next, hw, sink);
                Ok(format!("State: {next}"))
            }
            AppCommand::Flush(ms) => self.start_programmatic_flush(ms),
            AppCommand::Set(line) => self.apply_setting(&line, hw, sink),
            AppCommand::PumpPid => {
                let p = self.ctx.config.pressure_gains;
                let f = self.ctx.config.flow_gains;
                Ok(format!(
                    "Pressure PID kp={} ki={} kd={}; flow PID kp={} ki={} kd={}",
                    p.kp, p.ki, p.kd, f.kp, f.ki, f.kd
                ))
            }
            AppCommand::CalibrateScale => self.start_calibration(hw, sink),
            AppCommand::CalibrateNext(grams) => self.calibration_step(grams, hw, sink),
            AppCommand::TareScale => self.tare_scale(hw),

            // -- DEBUG only --
            AppCommand::Heater(on) => {
                self.ctx.commands.heater = on;
                self.apply_actuators(hw);
                Ok(format!("Heater {}", on_off(on)))
            }
            AppCommand::Pump(on) => {
                self.ctx.commands.pump = on;
                self.apply_actuators(hw);
                Ok(format!("Pump {}", on_off(on)))
            }
            AppCommand::FillValve(on) => {
                self.ctx.commands.fill_valve = on;
                self.apply_actuators(hw);
                Ok(format!("Fill valve {}", on_off(on)))
            }
            AppCommand::Dimmer(pct) => {
                self.ctx.commands.pump_power = pct.clamp(0.0, 100.0);
                self.apply_actuators(hw);
                Ok(format!("Pump power {:.0} %", self.ctx.commands.pump_power))
            }
            AppCommand::Buzzer(on) => {
                self.ctx.commands.buzzer = on;
                self.ctx.beep_until_ms = None;
                self.apply_actuators(hw);
                Ok(format!("Buzzer {}", on_off(on)))
            }
            AppCommand::Led(led, on) => {
                let leds = &mut self.ctx.commands.leds;
                match led {
                    Led::Main => leds.main = on,
                    Led::Heater => leds.heater = on,
                    Led::Water => leds.water = on,
                }
                self.apply_actuators(hw);
                Ok(format!("{led:?} LED {}", on_off(on)))
            }
            AppCommand::PidOutput(pct) => {
                self.ctx.heater.set_manual(pct);
                Ok(match self.ctx.heater.manual() {
                    Some(p) => format!("Heater output fixed at {p:.0} %"),
                    None => "Heater back under PID control".to_string(),
                })
            }
            AppCommand::CheckLevelIc => {
                let result = boiler_level::self_test(hw);
                Ok(format!("Level probe IC: {}", result.as_str()))
            }
            AppCommand::ReadWeight => self.read_weight(hw),
            AppCommand::WritePin(pin, high) => {
                hw.write_pin(pin, high);
                Ok(format!("{} <- {}", pin.name(), level_str(high)))
            }
            AppCommand::ReadPin(pin) => {
                let high = hw.read_pin(pin);
                Ok(format!("{} = {}", pin.name(), level_str(high)))
            }
            AppCommand::ReadAdc(channel) => {
                let code = hw.read_adc(channel);
                let volts = code as f32 / ADC_FULL_SCALE_CODE as f32 * ADC_FULL_SCALE_V;
                Ok(format!("ADC {}: {code} ({volts:.4} V)", channel as u8))
            }
            AppCommand::ReadHxTemp => {
                let code = hw.read_adc(AdcChannel::Hx);
                Ok(format!("HX {:.2} C (code {code})", self.hub.code_to_temp(code)))
            }
            AppCommand::ReadBoilerTemp => {
                let code = hw.read_adc(AdcChannel::Boiler);
                Ok(format!("Boiler {:.2} C (code {code})", self.hub.code_to_temp(code)))
            }
            AppCommand::ComputedBoiler => {
                let brew = self.ctx.config.brew_temp_c;
                let target = self.ctx.heater.computed_boiler_c(brew);
                Ok(format!("Computed boiler target {target:.2} C for brew {brew:.1} C"))
            }
            AppCommand::ReadPressure => {
                let code = hw.read_adc(AdcChannel::Pressure);
                Ok(format!("Pressure {:.2} bar (code {code})", pressure::code_to_bar(code)))
            }
            AppCommand::RawData(on) => {
                self.raw_stream = on.unwrap_or(!self.raw_stream);
                Ok(format!("Raw data stream {}", on_off(self.raw_stream)))
            }
        }
    }

    /// Apply one inbound `key=value` setting.
    ///
    /// The edit is made on a copy and validated before it replaces the
    /// live configuration; a rejected value changes nothing.  The profile
    /// is fixed for the length of a shot.
    pub fn apply_setting<H: MachineIo>(
        &mut self,
        line: &str,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        let (key, value, handler) = commands::lookup_setting(line)?;
        let mut next = self.ctx.config.clone();
        let action = handler(&mut next, value)?;

        if next.profile != self.ctx.config.profile && self.state() == StateId::Brewing {
            return Err(CommandError::WrongState("profile change during a shot").into());
        }
        if next != self.ctx.config {
            next.validate().map_err(CommandError::InvalidValue)?;
            self.ctx.config = next;
            self.ctx.pump.retune(&self.ctx.config);
            self.hub.retune(&self.ctx.config);
            self.mark_config_dirty();
            info!("Setting '{key}' updated");
            sink.emit(&AppEvent::SettingChanged(key));
        }

        match action {
            SettingAction::Stored => Ok(format!("{key} = {}", value.trim())),
            SettingAction::Ignored => Ok(format!("{key}: nothing to do")),
            SettingAction::TareScale => self.tare_scale(hw),
            SettingAction::StartCalibration => self.start_calibration(hw, sink),
            SettingAction::CalibrationStep(grams) => self.calibration_step(grams, hw, sink),
            SettingAction::StartCleaning => self.start_cleaning(hw, sink),
            SettingAction::Request => {
                self.publish_telemetry(sink);
                Ok("Telemetry published".to_string())
            }
        }
    }

    // ── Maintenance operations ────────────────────────────────

    /// Run blocking scale work.  The tick is stalled for the duration, so
    /// the section is refused while a shot is being pulled.
    pub fn with_maintenance<H, R>(
        &mut self,
        hw: &mut H,
        op: impl FnOnce(&mut Self, &mut H) -> Result<R>,
    ) -> Result<R>
    where
        H: MachineIo,
    {
        if self.state() == StateId::Brewing {
            return Err(CommandError::WrongState("scale maintenance during a shot").into());
        }
        let started = hw.now_ms();
        debug!("Maintenance section entered in {}", self.state());
        let result = op(self, hw);
        self.ctx.now_ms = hw.now_ms();
        debug!(
            "Maintenance section left after {} ms",
            self.ctx.now_ms.saturating_sub(started)
        );
        result
    }

    /// Zero the scale: reset the filters and store a 16-reading average as
    /// the offset.  The offset is applied but not persisted.
    pub fn tare_scale<H: MachineIo>(&mut self, hw: &mut H) -> Result<String> {
        self.with_maintenance(hw, |svc, hw| {
            let offset = calibration::stable_average(hw, STABLE_READINGS)?;
            svc.hub.reset_weight(hw.now_ms());
            svc.hub.set_scale_offset(offset);
            svc.ctx.config.scale_offset = offset;
            info!("Scale tared, offset {offset}");
            Ok(format!("Scale tared, offset {offset}"))
        })
    }

    /// Arm the calibration wizard (DEBUG, IDLE or HEATING only).
    pub fn start_calibration<H: MachineIo>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        self.ctx.calibration.begin(self.state())?;
        self.transition_to(StateId::CalibrationEmpty, hw, sink);
        Ok("Calibration started: empty the scale, then send 'calibratenext'".to_string())
    }

    /// Run the pending wizard step.  Completion stores the new offset and
    /// factor, persists them on the next save check and returns to the
    /// state the wizard was started from.
    pub fn calibration_step<H: MachineIo>(
        &mut self,
        weight_g: f32,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        let state = self.state();
        let outcome = self.with_maintenance(hw, |svc, hw| {
            let outcome = svc.ctx.calibration.advance(state, weight_g, hw)?;
            svc.hub.reset_weight(hw.now_ms());
            Ok(outcome)
        })?;

        match outcome {
            CalibrationOutcome::Tared { offset } => {
                self.hub.set_scale_offset(offset);
                self.ctx.config.scale_offset = offset;
                self.transition_to(StateId::CalibrationTestWeight, hw, sink);
                Ok(format!(
                    "Tared at {offset}: place the test weight, then send 'calibratenext <grams>'"
                ))
            }
            CalibrationOutcome::Complete {
                offset,
                scale,
                return_to,
            } => {
                self.ctx.config.scale_offset = offset;
                self.ctx.config.scale_factor = scale;
                self.hub.set_scale_calibration(offset, scale);
                self.mark_config_dirty();
                self.save_now = true;
                sink.emit(&AppEvent::ScaleCalibrated {
                    offset,
                    factor: scale,
                });
                self.transition_to(return_to, hw, sink);
                Ok(format!("Calibration complete: offset {offset}, factor {scale:.4}"))
            }
        }
    }

    /// Begin a cleaning cycle from IDLE, or from HEATING once the group is
    /// hot enough.
    pub fn start_cleaning<H: MachineIo>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<String> {
        let state = self.state();
        let hot = self.ctx.sensors.hx_temp_c >= CLEANING_MIN_HX_C;
        if !(state == StateId::Idle || (state == StateId::Heating && hot)) {
            return Err(
                CommandError::WrongState("cleaning needs IDLE, or HEATING with HX >= 80 C").into(),
            );
        }
        self.ctx.cleaning = CleaningCycle::default();
        info!("Cleaning cycle started from {state}");
        self.transition_to(StateId::CleaningStart, hw, sink);
        Ok("Cleaning started: lift the lever to run the first repetition".to_string())
    }

    /// Time-boxed pump run that leaves the state alone.  A second request
    /// while one is running restarts the window.
    pub fn start_programmatic_flush(&mut self, duration_ms: u64) -> Result<String> {
        let state = self.state();
        if !matches!(state, StateId::Heating | StateId::Idle) {
            return Err(CommandError::WrongState("flush needs HEATING or IDLE").into());
        }
        if self.ctx.inputs.lever_lifted {
            return Err(CommandError::LeverLifted.into());
        }
        if duration_ms == 0 {
            return Err(CommandError::InvalidValue("flush duration must be > 0").into());
        }
        let until = self.ctx.now_ms + duration_ms;
        if self.ctx.flush_until_ms.replace(until).is_some() {
            info!("Programmatic flush extended, {duration_ms} ms from now");
        } else {
            info!("Programmatic flush started for {duration_ms} ms");
        }
        Ok(format!("Flushing for {duration_ms} ms"))
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build a telemetry snapshot from the current context.
    pub fn build_telemetry(&mut self) -> TelemetryData {
        let s = &self.ctx.sensors;
        let c = &self.ctx.commands;
        let brew = self.ctx.config.brew_temp_c;
        TelemetryData {
            state: self.fsm.current_state(),
            brew_mode: self.ctx.config.brew_mode,
            boiler_temp_c: s.boiler_temp_c,
            hx_temp_c: s.hx_temp_c,
            brew_setpoint_c: brew,
            computed_boiler_c: self.ctx.heater.computed_boiler_c(brew),
            pressure_bar: s.pressure_bar,
            weight_g: s.weight_g,
            flow_g_per_s: s.flow_g_per_s,
            pump_on: c.pump,
            pump_output_pct: if c.pump { c.pump_power } else { 0.0 },
            pump_target: self.ctx.pump.target(),
            heater_on: c.heater,
            heater_output_pct: self.ctx.heater.output_pct(),
            lever_lifted: self.ctx.inputs.lever_lifted,
            heater_terms: self.ctx.heater.pid().terms(),
            pressure_terms: self.ctx.pump.pressure_loop().terms(),
            flow_terms: self.ctx.pump.flow_loop().terms(),
            fault_flags: self.ctx.fault_flags,
        }
    }

    pub fn raw_readings(&self) -> RawReadings {
        let s = &self.ctx.sensors;
        RawReadings {
            scale_raw: s.scale_raw,
            raw_weight_g: s.raw_weight_g,
            weight_g: s.weight_g,
            flow_g_per_s: s.flow_g_per_s,
            boiler_code: s.boiler_code,
            hx_code: s.hx_code,
            pressure_code: s.pressure_code,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current active fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.ctx.fault_flags
    }

    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &FsmContext {
        &self.ctx
    }

    pub fn sensors(&self) -> SensorSnapshot {
        self.ctx.sensors
    }

    pub fn raw_stream(&self) -> bool {
        self.raw_stream
    }

    // ── Internal ──────────────────────────────────────────────

    /// Track the two-way and three-way switches unless the matching
    /// setting was chosen remotely.  Returns `true` when the brew mode or
    /// the brew setpoint changed.
    fn follow_switches(&mut self, inputs: DebouncedInputs) -> bool {
        let cfg = &mut self.ctx.config;
        let mut changed = false;

        if !cfg.brew_mode_override {
            if inputs.steam_selected {
                cfg.brew_mode = BrewMode::Steam;
                cfg.steam_boost = true;
            } else {
                cfg.brew_mode = BrewMode::Coffee;
                cfg.steam_boost = false;
            }
        }
        if cfg.brew_mode != self.last_brew_mode {
            info!(
                "Brew mode {} -> {}",
                self.last_brew_mode.as_str(),
                cfg.brew_mode.as_str()
            );
            self.last_brew_mode = cfg.brew_mode;
            changed = true;
        }

        if !cfg.brew_temp_override {
            let target = SystemConfig::switch_brew_temp(inputs.three_way_1, inputs.three_way_2);
            if (target - cfg.brew_temp_c).abs() > SETPOINT_EPSILON_C {
                info!("Temperature switch: brew setpoint {target:.1} C");
                cfg.brew_temp_c = target;
                changed = true;
            }
        }
        changed
    }

    fn update_faults(&mut self, sink: &mut impl EventSink) {
        let before = self.ctx.fault_flags;
        let faults = self.safety.evaluate(&self.ctx.sensors);
        self.ctx.fault_flags = faults;

        if faults & !before != 0 {
            warn!("Safety fault! flags=0b{faults:04b}: {}", self.safety.last_error());
            sink.emit(&AppEvent::FaultDetected(faults));
        } else if faults == 0 && before != 0 {
            info!("All safety faults cleared");
            sink.emit(&AppEvent::FaultCleared);
        }
    }

    /// Jump to `next` outside the tick (commands) and publish the change.
    fn transition_to<H: MachineIo>(&mut self, next: StateId, hw: &mut H, sink: &mut impl EventSink) {
        self.ctx.now_ms = hw.now_ms();
        self.fsm.force_transition(next, &mut self.ctx);
        self.apply_actuators(hw);
        self.drain_transitions(sink);
    }

    fn drain_transitions(&mut self, sink: &mut impl EventSink) {
        for (from, to) in core::mem::take(&mut self.ctx.transitions) {
            if from == StateId::BoilerEmpty && to == StateId::Heating {
                self.hub.mark_boiler_full();
                self.ctx.sensors = self.hub.snapshot();
            }
            if to == StateId::Error {
                error!("Entering ERROR: {}", self.safety.last_error());
            }
            sink.emit(&AppEvent::StateChanged { from, to });
        }
    }

    /// Translate FSM actuator commands into port calls.
    fn apply_actuators(&mut self, hw: &mut impl ActuatorPort) {
        let debug = self.fsm.current_state() == StateId::Debug;
        // Faults keep the power stages off until ERROR has taken over.
        let interlocked = self.ctx.has_faults() && !debug;
        let cmds = self.ctx.commands;

        let pump = cmds.pump && !interlocked;
        hw.set_heater(cmds.heater && !interlocked);
        hw.set_pump_power(cmds.pump_power);
        hw.set_pump(pump);
        hw.set_fill_valve(cmds.fill_valve && !interlocked);
        if pump != self.pump_on {
            self.pump_on = pump;
            self.pump_changed_ms = Some(self.ctx.now_ms);
        }

        // DEBUG leaves the probe to `writepin`.
        if !debug {
            hw.set_level_probe(cmds.level_probe || self.hub.level_probe_requested());
        }

        let panel = self.panel.tick(cmds.indication, cmds.leds, self.ctx.now_ms);
        hw.set_led(Led::Main, panel.main);
        hw.set_led(Led::Heater, panel.heater);
        hw.set_led(Led::Water, panel.water);
        hw.set_buzzer(panel.buzzer || cmds.buzzer);
    }

    fn publish_telemetry(&mut self, sink: &mut impl EventSink) {
        let telemetry = self.build_telemetry();
        sink.emit(&AppEvent::Telemetry(telemetry));
        if self.raw_stream {
            sink.emit(&AppEvent::RawData(self.raw_readings()));
        }
    }

    fn read_weight<H: MachineIo>(&mut self, hw: &mut H) -> Result<String> {
        let mut attempts = 0;
        while !hw.conversion_available() {
            if attempts >= READ_WEIGHT_ATTEMPTS {
                return Err(SensorError::Timeout.into());
            }
            hw.delay_ms(READ_WEIGHT_POLL_MS);
            attempts += 1;
        }
        let raw = hw.read_conversion().value().map_err(Error::from)?;
        let w = self.hub.weight();
        Ok(format!(
            "Weight {:.1} g (instant {:.1} g, raw {raw}, offset {}, factor {:.4})",
            w.weight(),
            w.to_grams(raw),
            w.offset(),
            w.scale()
        ))
    }

    fn status_line(&mut self) -> String {
        let t = self.build_telemetry();
        format!(
            "{} | {} | boiler {:.1} C (target {:.1}) | HX {:.1} C (set {:.1}) | {:.2} bar | \
             {:.1} g, {:.2} g/s | heater {} {:.0} % | pump {} | lever {} | faults 0b{:04b}",
            t.state,
            t.brew_mode.as_str(),
            t.boiler_temp_c,
            t.computed_boiler_c,
            t.hx_temp_c,
            t.brew_setpoint_c,
            t.pressure_bar,
            t.weight_g,
            t.flow_g_per_s,
            on_off(t.heater_on),
            t.heater_output_pct,
            on_off(t.pump_on),
            if t.lever_lifted { "up" } else { "down" },
            t.fault_flags
        )
    }

    // ── Config dirty-flag management ──────────────────────────

    /// Mark the config as modified.
    pub fn mark_config_dirty(&mut self) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_ms = self.ctx.now_ms;
        }
    }

    /// Save once the config has been dirty for [`AUTO_SAVE_DELAY_MS`], or
    /// right away after a calibration.  Returns `true` if it was saved.
    pub fn auto_save_if_needed(&mut self, storage: &impl ConfigPort) -> bool {
        if !self.config_dirty {
            return false;
        }
        let waited = self.ctx.now_ms.saturating_sub(self.dirty_since_ms);
        if !self.save_now && waited < AUTO_SAVE_DELAY_MS {
            return false;
        }
        self.save(storage, "auto-saved")
    }

    /// Force-save if dirty (call before a controlled reboot).
    pub fn force_save_if_dirty(&mut self, storage: &impl ConfigPort) -> bool {
        self.config_dirty && self.save(storage, "force-saved")
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    fn save(&mut self, storage: &impl ConfigPort, how: &str) -> bool {
        match storage.save(&self.ctx.config) {
            Ok(()) => {
                self.config_dirty = false;
                self.save_now = false;
                info!("Config {how}");
                true
            }
            Err(e) => {
                warn!("Config save failed: {e}");
                false
            }
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}

fn level_str(high: bool) -> &'static str {
    if high { "HIGH" } else { "LOW" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{ClockPort, ConfigError, ScaleCode, ScalePort, SensorPort};
    use crate::pins::{InputPin, OutputPin};
    use crate::sensors::lut::TempLut;
    use crate::sensors::scale_isr::DataReady;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Rig {
        adc: [i32; 4],
        pins: [bool; 6],
        now: u64,
        heater: bool,
        pump: bool,
        probe: bool,
        boiler_water: bool,
        conversions: VecDeque<ScaleCode>,
        ready: DataReady,
        writes: Vec<(OutputPin, bool)>,
    }

    impl Rig {
        fn new() -> Self {
            let lut = TempLut::from_legacy();
            let mut pins = [false; 6];
            pins[InputPin::BrewSwitch as usize] = true;
            pins[InputPin::WaterDetector as usize] = true;
            Self {
                adc: [lut.code_for(120.0), lut.code_for(93.0), 0, pressure::bar_to_code(0.0)],
                pins,
                now: 10_000,
                heater: false,
                pump: false,
                probe: false,
                boiler_water: true,
                conversions: VecDeque::new(),
                ready: DataReady::new(),
                writes: Vec::new(),
            }
        }

        fn pin(&mut self, pin: InputPin, high: bool) {
            self.pins[pin as usize] = high;
        }
    }

    impl SensorPort for Rig {
        fn read_adc(&mut self, channel: AdcChannel) -> i32 {
            self.adc[channel as usize]
        }
        fn read_pin(&mut self, pin: InputPin) -> bool {
            match pin {
                // The LM1830 only answers while powered.
                InputPin::BoilerLevel => self.probe && self.boiler_water,
                _ => self.pins[pin as usize],
            }
        }
    }

    impl ActuatorPort for Rig {
        fn set_heater(&mut self, on: bool) {
            self.heater = on;
        }
        fn set_pump(&mut self, on: bool) {
            self.pump = on;
        }
        fn set_pump_power(&mut self, _percent: f32) {}
        fn set_fill_valve(&mut self, _open: bool) {}
        fn set_level_probe(&mut self, enabled: bool) {
            self.probe = enabled;
        }
        fn set_buzzer(&mut self, _on: bool) {}
        fn set_led(&mut self, _led: Led, _on: bool) {}
        fn write_pin(&mut self, pin: OutputPin, high: bool) {
            self.writes.push((pin, high));
        }
        fn all_off(&mut self) {
            self.heater = false;
            self.pump = false;
        }
    }

    impl ScalePort for Rig {
        fn data_ready(&self) -> &DataReady {
            &self.ready
        }
        fn conversion_available(&mut self) -> bool {
            !self.conversions.is_empty()
        }
        fn read_conversion(&mut self) -> ScaleCode {
            self.conversions.pop_front().unwrap_or(ScaleCode::NotReady)
        }
        fn configure(&mut self) {}
    }

    impl ClockPort for Rig {
        fn now_ms(&self) -> u64 {
            self.now
        }
        fn delay_ms(&mut self, ms: u32) {
            self.now += u64::from(ms);
        }
    }

    #[derive(Default)]
    struct Events(Vec<AppEvent>);

    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(event.clone());
        }
    }

    #[derive(Default)]
    struct Store(RefCell<Option<SystemConfig>>);

    impl ConfigPort for Store {
        fn load(&self) -> core::result::Result<SystemConfig, ConfigError> {
            self.0.borrow().clone().ok_or(ConfigError::NotFound)
        }
        fn save(&self, config: &SystemConfig) -> core::result::Result<(), ConfigError> {
            *self.0.borrow_mut() = Some(config.clone());
            Ok(())
        }
    }

    fn booted(rig: &mut Rig) -> (AppService, Events) {
        let mut app = AppService::new(SystemConfig::default());
        let mut events = Events::default();
        app.start(rig, &mut events);
        (app, events)
    }

    fn run_for(app: &mut AppService, rig: &mut Rig, events: &mut Events, ms: u64) {
        for _ in 0..ms / 10 {
            rig.now += 10;
            app.tick(rig, events);
        }
    }

    #[test]
    fn boots_through_init_to_heating() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        assert_eq!(app.state(), StateId::Init);
        assert_eq!(events.0[0], AppEvent::Started(StateId::Init));
        run_for(&mut app, &mut rig, &mut events, 20);
        assert_eq!(app.state(), StateId::Heating);
        assert!(events.0.contains(&AppEvent::StateChanged {
            from: StateId::Init,
            to: StateId::Heating,
        }));
    }

    #[test]
    fn profile_is_fixed_for_the_shot() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        run_for(&mut app, &mut rig, &mut events, 20);
        rig.pin(InputPin::BrewSwitch, false);
        run_for(&mut app, &mut rig, &mut events, 500);
        assert_eq!(app.state(), StateId::Brewing);

        let before = app.config().profile.clone();
        let line = r#"profile_data={"n":"Turbo","m":1,"s":[[2,8]]}"#;
        assert_eq!(
            app.apply_setting(line, &mut rig, &mut events),
            Err(Error::Command(CommandError::WrongState(
                "profile change during a shot"
            )))
        );
        assert_eq!(app.config().profile, before);
        assert!(!app.is_config_dirty());

        // Other settings still apply mid-shot.
        assert!(app.apply_setting("kp_pressure=0.3", &mut rig, &mut events).is_ok());

        rig.pin(InputPin::BrewSwitch, true);
        run_for(&mut app, &mut rig, &mut events, 500);
        assert_ne!(app.state(), StateId::Brewing);
        assert!(app.apply_setting(line, &mut rig, &mut events).is_ok());
        assert_eq!(app.config().profile.name.as_str(), "Turbo");
    }

    #[test]
    fn lever_held_at_boot_enters_debug() {
        let mut rig = Rig::new();
        rig.pin(InputPin::BrewSwitch, false);
        let (app, _) = booted(&mut rig);
        assert_eq!(app.state(), StateId::Debug);
    }

    #[test]
    fn empty_tank_at_boot_stays_put() {
        let mut rig = Rig::new();
        rig.pin(InputPin::WaterDetector, false);
        let (mut app, mut events) = booted(&mut rig);
        assert_eq!(app.state(), StateId::WaterEmpty);
        run_for(&mut app, &mut rig, &mut events, 50);
        assert_eq!(app.state(), StateId::WaterEmpty);
    }

    #[test]
    fn dry_boiler_at_boot() {
        let mut rig = Rig::new();
        rig.boiler_water = false;
        let (app, _) = booted(&mut rig);
        assert_eq!(app.state(), StateId::BoilerEmpty);
    }

    #[test]
    fn railed_thermistor_at_boot_is_an_error() {
        let mut rig = Rig::new();
        rig.adc[AdcChannel::Hx as usize] = 32_700;
        let (app, _) = booted(&mut rig);
        assert_eq!(app.state(), StateId::Error);
        assert_ne!(app.fault_flags(), 0);
    }

    #[test]
    fn debug_commands_refused_outside_debug() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        let err = app.handle_line("heater on", &mut rig, &mut events);
        assert_eq!(err, Err(Error::Command(CommandError::DebugOnly)));
    }

    #[test]
    fn debug_toggle_and_pokes() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        run_for(&mut app, &mut rig, &mut events, 20);
        assert!(app.handle_line("debug", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::Debug);

        assert!(app.handle_line("heater on", &mut rig, &mut events).is_ok());
        assert!(rig.heater);
        assert!(app.handle_line("writepin buzzer hi", &mut rig, &mut events).is_ok());
        assert_eq!(rig.writes, vec![(OutputPin::Buzzer, true)]);

        assert!(app.handle_line("debug", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::Heating);
    }

    #[test]
    fn flush_rules() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        // Still INIT.
        assert!(matches!(
            app.start_programmatic_flush(1000),
            Err(Error::Command(CommandError::WrongState(_)))
        ));
        run_for(&mut app, &mut rig, &mut events, 20);
        assert!(app.start_programmatic_flush(0).is_err());
        assert!(app.start_programmatic_flush(3000).is_ok());
        run_for(&mut app, &mut rig, &mut events, 100);
        assert_eq!(app.state(), StateId::Heating);
        assert!(rig.pump);
        run_for(&mut app, &mut rig, &mut events, 3000);
        assert!(!rig.pump);
    }

    #[test]
    fn rejected_setting_changes_nothing() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        let before = app.config().clone();
        assert!(app.apply_setting("tempsetsteam=400", &mut rig, &mut events).is_err());
        assert_eq!(app.config(), &before);
        assert!(!app.is_config_dirty());
    }

    #[test]
    fn settings_auto_save_after_delay() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        let store = Store::default();
        assert!(app.apply_setting("kp_pressure=0.2", &mut rig, &mut events).is_ok());
        assert!(events.0.contains(&AppEvent::SettingChanged("kp_pressure")));
        assert!(app.is_config_dirty());

        run_for(&mut app, &mut rig, &mut events, 1000);
        assert!(!app.auto_save_if_needed(&store));
        run_for(&mut app, &mut rig, &mut events, 4100);
        assert!(app.auto_save_if_needed(&store));
        assert!(!app.is_config_dirty());
        assert_eq!(store.load().map(|c| c.pressure_gains.kp), Ok(0.2));
    }

    #[test]
    fn remote_brew_temp_overrides_switch() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        assert_eq!(app.config().brew_temp_c, 92.0);
        assert!(app.apply_setting("tempsetbrew=93.5", &mut rig, &mut events).is_ok());
        rig.pin(InputPin::ThreeWaySwitch2, true);
        run_for(&mut app, &mut rig, &mut events, 20);
        assert_eq!(app.config().brew_temp_c, 93.5);
    }

    #[test]
    fn temperature_switch_moves_setpoint() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        rig.pin(InputPin::ThreeWaySwitch2, true);
        run_for(&mut app, &mut rig, &mut events, 20);
        assert_eq!(app.config().brew_temp_c, 94.0);
        assert!(!app.is_config_dirty());
    }

    #[test]
    fn tare_applies_offset_without_saving() {
        let mut rig = Rig::new();
        let (mut app, _) = booted(&mut rig);
        rig.conversions = (0..20).map(|_| ScaleCode::Value(1234)).collect();
        let reply = app.tare_scale(&mut rig);
        assert!(reply.is_ok());
        assert_eq!(app.config().scale_offset, 1234);
        assert!(!app.is_config_dirty());
    }

    #[test]
    fn calibration_wizard_round_trip() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        run_for(&mut app, &mut rig, &mut events, 20);
        assert!(app.handle_line("calibratescale", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::CalibrationEmpty);

        rig.conversions = (0..20).map(|_| ScaleCode::Value(1000)).collect();
        assert!(app.handle_line("calibratenext", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::CalibrationTestWeight);

        rig.conversions = (0..20).map(|_| ScaleCode::Value(21_000)).collect();
        assert!(app.handle_line("calibratenext 100", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::Heating);
        assert_eq!(app.config().scale_offset, 1000);
        assert_eq!(app.config().scale_factor, 200.0);

        // Calibration results skip the debounce delay.
        let store = Store::default();
        assert!(app.auto_save_if_needed(&store));
    }

    #[test]
    fn calibration_refused_in_wrong_state() {
        let mut rig = Rig::new();
        rig.pin(InputPin::WaterDetector, false);
        let (mut app, mut events) = booted(&mut rig);
        assert!(app.handle_line("calibratescale", &mut rig, &mut events).is_err());
        assert_eq!(app.state(), StateId::WaterEmpty);
    }

    #[test]
    fn cleaning_needs_hot_group_from_heating() {
        let mut rig = Rig::new();
        rig.adc[AdcChannel::Hx as usize] = TempLut::from_legacy().code_for(60.0);
        let (mut app, mut events) = booted(&mut rig);
        run_for(&mut app, &mut rig, &mut events, 20);
        assert_eq!(app.state(), StateId::Heating);
        assert!(app.apply_setting("start_cleaning=true", &mut rig, &mut events).is_err());

        rig.adc[AdcChannel::Hx as usize] = TempLut::from_legacy().code_for(93.0);
        run_for(&mut app, &mut rig, &mut events, 2000);
        assert!(app.apply_setting("start_cleaning=true", &mut rig, &mut events).is_ok());
        assert_eq!(app.state(), StateId::CleaningStart);
    }

    #[test]
    fn telemetry_once_per_second() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        run_for(&mut app, &mut rig, &mut events, 3000);
        let count = events
            .0
            .iter()
            .filter(|e| matches!(e, AppEvent::Telemetry(_)))
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn last_error_reports_fault() {
        let mut rig = Rig::new();
        let (mut app, mut events) = booted(&mut rig);
        assert_eq!(
            app.handle_line("lasterror", &mut rig, &mut events).as_deref(),
            Ok("No critical error has been recorded.")
        );
        rig.adc[AdcChannel::Boiler as usize] = 100;
        run_for(&mut app, &mut rig, &mut events, 3000);
        assert_eq!(app.state(), StateId::Error);
        assert!(!rig.heater);
        let reply = app.handle_line("lasterror", &mut rig, &mut events);
        assert!(reply.is_ok_and(|r| r.contains("Boiler")));
    }
}
