//! Mock machine for integration tests.
//!
//! One struct stands in for the whole board: it answers every port the
//! tick needs and records actuator state so tests can assert on it
//! without touching real GPIO or I²C.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use espresso_core::app::events::{AppEvent, TelemetryData};
use espresso_core::app::ports::{
    ActuatorPort, ClockPort, ConfigError, ConfigPort, EventSink, Led, ScaleCode, ScalePort,
    SensorPort,
};
use espresso_core::app::service::AppService;
use espresso_core::config::SystemConfig;
use espresso_core::fsm::StateId;
use espresso_core::pins::{AdcChannel, InputPin, OutputPin};
use espresso_core::sensors::lut::TempLut;
use espresso_core::sensors::pressure;
use espresso_core::sensors::scale_isr::DataReady;

/// Tick period used by [`run_for`].
pub const TICK_MS: u64 = 10;

// ── MockMachine ───────────────────────────────────────────────

pub struct MockMachine {
    pub adc: [i32; 4],
    pub pins: [bool; 6],
    pub now: u64,
    /// Water above the level probe.  Only visible while the probe is on.
    pub boiler_water: bool,
    pub heater: bool,
    pub pump: bool,
    pub pump_power: f32,
    pub fill_valve: bool,
    pub probe: bool,
    pub buzzer: bool,
    pub leds: [bool; 3],
    pub writes: Vec<(OutputPin, bool)>,
    pub all_off_calls: u32,
    pub configure_calls: u32,
    pub conversions: VecDeque<ScaleCode>,
    pub ready: DataReady,
    lut: TempLut,
}

#[allow(dead_code)]
impl MockMachine {
    /// Warm machine, switches at rest, lever down, tank and boiler full.
    pub fn new() -> Self {
        let lut = TempLut::from_legacy();
        let mut pins = [false; 6];
        // Lever and water detector are active-low.
        pins[InputPin::BrewSwitch as usize] = true;
        pins[InputPin::WaterDetector as usize] = true;
        Self {
            adc: [
                lut.code_for(120.0),
                lut.code_for(93.0),
                0,
                pressure::bar_to_code(0.0),
            ],
            pins,
            now: 10_000,
            boiler_water: true,
            heater: false,
            pump: false,
            pump_power: 0.0,
            fill_valve: false,
            probe: false,
            buzzer: false,
            leds: [false; 3],
            writes: Vec::new(),
            all_off_calls: 0,
            configure_calls: 0,
            conversions: VecDeque::new(),
            ready: DataReady::new(),
            lut,
        }
    }

    pub fn set_boiler_c(&mut self, c: f32) {
        self.adc[AdcChannel::Boiler as usize] = self.lut.code_for(c);
    }

    pub fn set_hx_c(&mut self, c: f32) {
        self.adc[AdcChannel::Hx as usize] = self.lut.code_for(c);
    }

    pub fn set_pressure_bar(&mut self, bar: f32) {
        self.adc[AdcChannel::Pressure as usize] = pressure::bar_to_code(bar);
    }

    pub fn lift_lever(&mut self) {
        self.pins[InputPin::BrewSwitch as usize] = false;
    }

    pub fn lower_lever(&mut self) {
        self.pins[InputPin::BrewSwitch as usize] = true;
    }

    pub fn set_tank_empty(&mut self, empty: bool) {
        self.pins[InputPin::WaterDetector as usize] = !empty;
    }

    pub fn set_pin(&mut self, pin: InputPin, high: bool) {
        self.pins[pin as usize] = high;
    }

    /// Queue one load-cell conversion and raise data-ready.
    pub fn push_scale(&mut self, raw: i32) {
        self.conversions.push_back(ScaleCode::Value(raw));
        self.ready.signal();
    }

    /// Queue `n` identical conversions for a blocking average.
    pub fn queue_scale(&mut self, raw: i32, n: usize) {
        self.conversions
            .extend(std::iter::repeat_n(ScaleCode::Value(raw), n));
    }

    pub fn led(&self, led: Led) -> bool {
        self.leds[led_index(led)]
    }
}

impl Default for MockMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn led_index(led: Led) -> usize {
    match led {
        Led::Main => 0,
        Led::Heater => 1,
        Led::Water => 2,
    }
}

impl SensorPort for MockMachine {
    fn read_adc(&mut self, channel: AdcChannel) -> i32 {
        self.adc[channel as usize]
    }

    fn read_pin(&mut self, pin: InputPin) -> bool {
        match pin {
            InputPin::BoilerLevel => self.probe && self.boiler_water,
            _ => self.pins[pin as usize],
        }
    }
}

impl ActuatorPort for MockMachine {
    fn set_heater(&mut self, on: bool) {
        self.heater = on;
    }

    fn set_pump(&mut self, on: bool) {
        self.pump = on;
    }

    fn set_pump_power(&mut self, percent: f32) {
        self.pump_power = percent;
    }

    fn set_fill_valve(&mut self, open: bool) {
        self.fill_valve = open;
    }

    fn set_level_probe(&mut self, enabled: bool) {
        self.probe = enabled;
    }

    fn set_buzzer(&mut self, on: bool) {
        self.buzzer = on;
    }

    fn set_led(&mut self, led: Led, on: bool) {
        self.leds[led_index(led)] = on;
    }

    fn write_pin(&mut self, pin: OutputPin, high: bool) {
        self.writes.push((pin, high));
    }

    fn all_off(&mut self) {
        self.all_off_calls += 1;
        self.heater = false;
        self.pump = false;
        self.fill_valve = false;
    }
}

impl ScalePort for MockMachine {
    fn data_ready(&self) -> &DataReady {
        &self.ready
    }

    fn conversion_available(&mut self) -> bool {
        !self.conversions.is_empty()
    }

    fn read_conversion(&mut self) -> ScaleCode {
        self.conversions.pop_front().unwrap_or(ScaleCode::NotReady)
    }

    fn configure(&mut self) {
        self.configure_calls += 1;
    }
}

impl ClockPort for MockMachine {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}

// ── Recording event sink ──────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn saw_transition(&self, from: StateId, to: StateId) -> bool {
        self.transitions().contains(&(from, to))
    }

    pub fn telemetry(&self) -> Vec<&TelemetryData> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Telemetry(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── MockNvs ───────────────────────────────────────────────────

/// In-memory config store that counts writes.
#[derive(Default)]
pub struct MockNvs {
    stored: RefCell<Option<SystemConfig>>,
    saves: Cell<u32>,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(config: SystemConfig) -> Self {
        Self {
            stored: RefCell::new(Some(config)),
            saves: Cell::new(0),
        }
    }

    pub fn saves(&self) -> u32 {
        self.saves.get()
    }

    pub fn stored(&self) -> Option<SystemConfig> {
        self.stored.borrow().clone()
    }
}

impl ConfigPort for MockNvs {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        Ok(self.stored.borrow().clone().unwrap_or_default())
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate().map_err(ConfigError::ValidationFailed)?;
        *self.stored.borrow_mut() = Some(config.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────

#[allow(dead_code)]
pub fn boot(hw: &mut MockMachine, config: SystemConfig) -> (AppService, RecordingSink) {
    let mut app = AppService::new(config);
    let mut sink = RecordingSink::new();
    app.start(hw, &mut sink);
    (app, sink)
}

/// Boot with defaults and run until the INIT pass is over.
#[allow(dead_code)]
pub fn boot_to_heating(hw: &mut MockMachine) -> (AppService, RecordingSink) {
    let (mut app, mut sink) = boot(hw, SystemConfig::default());
    run_for(&mut app, hw, &mut sink, 2 * TICK_MS);
    (app, sink)
}

#[allow(dead_code)]
pub fn run_for(app: &mut AppService, hw: &mut MockMachine, sink: &mut RecordingSink, ms: u64) {
    for _ in 0..ms / TICK_MS {
        hw.now += TICK_MS;
        app.tick(hw, sink);
    }
}

/// Tick until `state` is reached or `limit_ms` runs out.
#[allow(dead_code)]
pub fn run_until(
    app: &mut AppService,
    hw: &mut MockMachine,
    sink: &mut RecordingSink,
    state: StateId,
    limit_ms: u64,
) -> bool {
    for _ in 0..limit_ms / TICK_MS {
        if app.state() == state {
            return true;
        }
        hw.now += TICK_MS;
        app.tick(hw, sink);
    }
    app.state() == state
}
