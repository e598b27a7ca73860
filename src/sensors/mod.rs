//! Sensor subsystem: conversion/filter building blocks and the
//! aggregating [`SensorHub`].
//!
//! The hub owns every filter and produces a [`SensorSnapshot`] each tick
//! that gets written into `FsmContext.sensors`.
//!
//! ```text
//!  ADS1115 ch0/ch1 ─▶ TempLut ─▶ MovingAverage<10> ─▶ boiler / HX °C
//!  ADS1115 ch3     ─▶ code_to_bar ─▶ MovingAverage<10> ─▶ bar
//!  ADS1232         ─▶ WeightPipeline ─▶ grams, g/s
//!  GPIO            ─▶ Debouncer (lever, water) / raw (switches)
//!  LM1830          ─▶ BoilerLevelMonitor
//! ```

pub mod boiler_level;
pub mod debounce;
pub mod kalman;
pub mod legacy_table;
pub mod lut;
pub mod pressure;
pub mod scale_isr;
pub mod smoothing;
pub mod spike_guard;
pub mod weight;

use log::{debug, info};

use crate::app::ports::{ActuatorPort, ClockPort, ScaleCode, ScalePort, SensorPort};
use crate::config::SystemConfig;
use crate::error::SafetyFault;
use crate::fsm::context::{DebouncedInputs, SensorSnapshot};
use crate::pins::{AdcChannel, InputPin};
use crate::safety::{self, ADC_RAILED_THRESHOLD};
use boiler_level::BoilerLevelMonitor;
use debounce::{DEBOUNCE_MS, Debouncer};
use lut::TempLut;
use smoothing::MovingAverage;
use weight::{POST_SHOT_DRIP_MS, WeightPipeline};

/// Samples in the temperature and pressure moving averages.
pub const SMOOTHING_SAMPLES: usize = 10;

/// Reads are skipped this long after any electrical disturbance.
pub const READ_SETTLE_MS: u64 = 200;

/// Warm-up gives each thermistor this long to leave the railed band.
pub const WARM_UP_TIMEOUT_MS: u64 = 250;

/// Iteration ceiling for warm-up if the clock does not advance.
const WARM_UP_MAX_SAMPLES: u32 = 250;

/// Recent disturbances that gate sensor reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadGate {
    /// `None` until the first state transition; no gating before that.
    pub last_transition_ms: Option<u64>,
    pub pump_changed_ms: Option<u64>,
}

/// Aggregates all sensor filters and produces a unified snapshot.
pub struct SensorHub {
    lut: TempLut,
    boiler_avg: MovingAverage<SMOOTHING_SAMPLES>,
    hx_avg: MovingAverage<SMOOTHING_SAMPLES>,
    pressure_avg: MovingAverage<SMOOTHING_SAMPLES>,
    lever: Debouncer,
    water: Debouncer,
    weight: WeightPipeline,
    level: BoilerLevelMonitor,
    inputs: DebouncedInputs,
    snapshot: SensorSnapshot,
    shot_end_ms: Option<u64>,
}

impl SensorHub {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            lut: TempLut::from_legacy(),
            boiler_avg: MovingAverage::new(),
            hx_avg: MovingAverage::new(),
            pressure_avg: MovingAverage::new(),
            lever: Debouncer::new(false, DEBOUNCE_MS),
            water: Debouncer::new(false, DEBOUNCE_MS),
            weight: WeightPipeline::new(
                config.scale_offset,
                config.scale_factor,
                config.weight_kalman,
                config.flow_kalman,
            ),
            level: BoilerLevelMonitor::new(false),
            inputs: DebouncedInputs::default(),
            snapshot: SensorSnapshot::default(),
            shot_end_ms: None,
        }
    }

    // ── Start-up ──────────────────────────────────────────────────

    /// Sample each thermistor until it leaves the railed band (or the
    /// warm-up timeout passes), then seed every average with that value.
    pub fn warm_up<H: SensorPort + ClockPort>(&mut self, hw: &mut H) {
        let boiler_code = Self::settle_channel(hw, AdcChannel::Boiler);
        let hx_code = Self::settle_channel(hw, AdcChannel::Hx);
        let pressure_code = hw.read_adc(AdcChannel::Pressure);

        let boiler_c = self.lut.convert(boiler_code);
        let hx_c = self.lut.convert(hx_code);
        let bar = pressure::code_to_bar(pressure_code);
        self.boiler_avg.seed(boiler_c);
        self.hx_avg.seed(hx_c);
        self.pressure_avg.seed(bar);

        let s = &mut self.snapshot;
        s.boiler_code = boiler_code;
        s.hx_code = hx_code;
        s.pressure_code = pressure_code;
        s.boiler_temp_c = boiler_c;
        s.hx_temp_c = hx_c;
        s.pressure_bar = bar;
        info!("Sensors warmed up: boiler {boiler_c:.1} C, HX {hx_c:.1} C, {bar:.2} bar");
    }

    fn settle_channel<H: SensorPort + ClockPort>(hw: &mut H, channel: AdcChannel) -> i32 {
        let start = hw.now_ms();
        let mut code = hw.read_adc(channel);
        let mut samples = 1;
        while code < ADC_RAILED_THRESHOLD
            && hw.now_ms().saturating_sub(start) <= WARM_UP_TIMEOUT_MS
            && samples < WARM_UP_MAX_SAMPLES
        {
            hw.delay_ms(1);
            code = hw.read_adc(channel);
            samples += 1;
        }
        code
    }

    /// One-shot blocking level read at boot.
    pub fn detect_boiler_level<H>(&mut self, hw: &mut H, pump_running: bool) -> bool
    where
        H: SensorPort + ActuatorPort + ClockPort,
    {
        let water = boiler_level::detect_at_boot(hw, pump_running);
        self.level = BoilerLevelMonitor::new(!water);
        self.snapshot.boiler_empty = !water;
        water
    }

    /// Start both debouncers from the levels present at power-on so a
    /// lever held or a tank already empty at boot counts immediately.
    pub fn seed_inputs<H: SensorPort>(&mut self, hw: &mut H) -> DebouncedInputs {
        let lever_raw = !hw.read_pin(InputPin::BrewSwitch);
        let water_raw = !hw.read_pin(InputPin::WaterDetector);
        self.lever = Debouncer::new(lever_raw, DEBOUNCE_MS);
        self.water = Debouncer::new(water_raw, DEBOUNCE_MS);

        self.inputs = DebouncedInputs {
            lever_lifted: lever_raw,
            water_tripped: water_raw,
            three_way_1: hw.read_pin(InputPin::ThreeWaySwitch1),
            three_way_2: hw.read_pin(InputPin::ThreeWaySwitch2),
            steam_selected: hw.read_pin(InputPin::TwoWaySwitch),
            lever_changed: false,
            water_changed: false,
        };
        self.inputs
    }

    // ── Per-tick ──────────────────────────────────────────────────

    /// Sample and debounce the digital inputs.
    pub fn poll_inputs<H: SensorPort>(&mut self, hw: &mut H, now_ms: u64) -> DebouncedInputs {
        // Brew switch LOW = lever lifted; water detector LOW = tank empty.
        let lever_raw = !hw.read_pin(InputPin::BrewSwitch);
        let water_raw = !hw.read_pin(InputPin::WaterDetector);

        let lever_changed = self.lever.update(lever_raw, now_ms).is_some();
        let water_changed = self.water.update(water_raw, now_ms).is_some();
        if lever_changed {
            debug!("Lever {}", if self.lever.value() { "LIFTED" } else { "DOWN" });
        }

        self.inputs = DebouncedInputs {
            lever_lifted: self.lever.value(),
            water_tripped: self.water.value(),
            three_way_1: hw.read_pin(InputPin::ThreeWaySwitch1),
            three_way_2: hw.read_pin(InputPin::ThreeWaySwitch2),
            steam_selected: hw.read_pin(InputPin::TwoWaySwitch),
            lever_changed,
            water_changed,
        };
        self.inputs
    }

    /// Sample temperatures and pressure unless a recent disturbance gates
    /// the read.  Returns whether new samples were taken.
    pub fn update_readings<H: SensorPort>(&mut self, hw: &mut H, now_ms: u64, gate: ReadGate) -> bool {
        if gate.last_transition_ms.is_some() {
            let recent = [
                gate.last_transition_ms,
                self.lever.changed_at(),
                self.water.changed_at(),
                gate.pump_changed_ms,
            ]
            .into_iter()
            .flatten()
            .any(|t| now_ms.saturating_sub(t) < READ_SETTLE_MS);
            if recent {
                return false;
            }
        }

        let boiler_code = hw.read_adc(AdcChannel::Boiler);
        let hx_code = hw.read_adc(AdcChannel::Hx);
        let pressure_code = hw.read_adc(AdcChannel::Pressure);

        let s = &mut self.snapshot;
        s.boiler_code = boiler_code;
        s.hx_code = hx_code;
        s.pressure_code = pressure_code;
        s.boiler_temp_c = self.boiler_avg.push(self.lut.convert(boiler_code));
        s.hx_temp_c = self.hx_avg.push(self.lut.convert(hx_code));
        s.pressure_bar = self.pressure_avg.push(pressure::code_to_bar(pressure_code));
        true
    }

    /// Lever came down during a shot: flow keeps being tracked for the
    /// drip window.
    pub fn mark_shot_end(&mut self, now_ms: u64) {
        self.shot_end_ms = Some(now_ms);
    }

    /// Lever lifted or within the post-shot drip window.
    pub fn shot_active(&mut self, now_ms: u64) -> bool {
        if let Some(end) = self.shot_end_ms {
            if now_ms.saturating_sub(end) < POST_SHOT_DRIP_MS {
                return true;
            }
            self.shot_end_ms = None;
        }
        self.inputs.lever_lifted
    }

    /// Consume a pending load-cell conversion.  Returns the raw grams of
    /// the conversion when one was processed.
    pub fn handle_scale<S: ScalePort>(&mut self, scale: &mut S, now_ms: u64) -> Option<f32> {
        if !scale.data_ready().is_set() {
            return None;
        }
        // Full-scale and not-ready leave the flag set for the next tick.
        let ScaleCode::Value(raw) = scale.read_conversion() else {
            return None;
        };

        let shot_active = self.shot_active(now_ms);
        self.weight.process(raw, now_ms, shot_active);
        scale.data_ready().latch(raw);

        let s = &mut self.snapshot;
        s.scale_raw = raw;
        s.raw_weight_g = self.weight.raw_weight();
        s.weight_g = self.weight.weight();
        s.flow_g_per_s = self.weight.flow_rate();
        Some(s.raw_weight_g)
    }

    /// Advance the periodic level measurement.
    pub fn poll_level<H: SensorPort>(
        &mut self,
        hw: &mut H,
        now_ms: u64,
        pump_running: bool,
        inhibited: bool,
    ) {
        let pin = hw.read_pin(InputPin::BoilerLevel);
        self.level.poll(now_ms, pin, pump_running, inhibited);
        self.snapshot.boiler_water_detected = pin;
        self.snapshot.boiler_empty = self.level.is_empty();
        self.snapshot.level_probe_stuck_high = self.level.stuck_high();
    }

    /// Whether the periodic measurement currently powers the probe.
    pub fn level_probe_requested(&self) -> bool {
        self.level.probe_enabled()
    }

    /// The fill cycle saw the boiler full.
    pub fn mark_boiler_full(&mut self) {
        self.level.mark_full();
        self.snapshot.boiler_empty = false;
    }

    // ── Scale maintenance ─────────────────────────────────────────

    /// Reset both Kalman filters and the spike guard ahead of a tare.
    pub fn reset_weight(&mut self, now_ms: u64) {
        self.weight.reset(now_ms);
        let s = &mut self.snapshot;
        s.weight_g = 0.0;
        s.raw_weight_g = 0.0;
        s.flow_g_per_s = 0.0;
    }

    pub fn set_scale_offset(&mut self, offset: i32) {
        self.weight.set_offset(offset);
    }

    pub fn set_scale_calibration(&mut self, offset: i32, factor: f32) {
        self.weight.set_calibration(offset, factor);
    }

    /// Push changed Kalman parameters into the weight pipeline.
    pub fn retune(&mut self, config: &SystemConfig) {
        self.weight.retune(config.weight_kalman, config.flow_kalman);
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> SensorSnapshot {
        self.snapshot
    }

    pub fn inputs(&self) -> DebouncedInputs {
        self.inputs
    }

    /// First critical sensor failure in the current snapshot.
    pub fn critical_failure(&self) -> Option<SafetyFault> {
        safety::first_fault(&self.snapshot)
    }

    pub fn weight(&self) -> &WeightPipeline {
        &self.weight
    }

    pub fn lut(&self) -> &TempLut {
        &self.lut
    }

    /// Convert a raw thermistor code with the board table.
    pub fn code_to_temp(&self, code: i32) -> f32 {
        self.lut.convert(code)
    }
}
