//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns every driver and the shared I²C bus, exposing them through
//! [`SensorPort`], [`ActuatorPort`], [`ScalePort`] and [`ClockPort`].
//! This is the only module in the system that touches actual hardware.
//! On non-espidf targets the drivers write the simulated pin bank in
//! `hw_init`, so the adapter runs unchanged on the host.

use embedded_hal::i2c::I2c;
use log::warn;

use crate::adapters::time::MonotonicClock;
use crate::app::ports::{ActuatorPort, ClockPort, Led, ScaleCode, ScalePort, SensorPort};
use crate::drivers::ads1115::Ads1115;
use crate::drivers::ads1232::{Ads1232, ScaleControl};
use crate::drivers::heater::HeaterSsr;
use crate::drivers::hw_init::{self, GpioLine};
use crate::drivers::indicators::FrontPanel;
use crate::drivers::level_probe::LevelProbe;
use crate::drivers::pump::PumpDriver;
use crate::pins::{self, AdcChannel, InputPin, OutputPin};
use crate::sensors::scale_isr::{DataReady, SCALE_DATA_READY};

/// Code reported for a failed ADS1115 read.  It sits inside the railed
/// band, so the safety supervisor latches the matching sensor fault.
const FAILED_READ_CODE: i32 = 0;

/// Concrete adapter that combines all hardware behind port traits.
pub struct BoardAdapter<I> {
    i2c: I,
    clock: MonotonicClock,
    adc: Ads1115,
    scale: Ads1232<GpioLine, GpioLine>,
    scale_ctl: ScaleControl,
    heater: HeaterSsr,
    pump: PumpDriver,
    probe: LevelProbe,
    panel: FrontPanel,
    i2c_errors: u32,
}

impl<I: I2c> BoardAdapter<I> {
    /// Build the adapter.  GPIO directions must already be set by
    /// [`hw_init::init_peripherals`].
    pub fn new(i2c: I, clock: MonotonicClock) -> Self {
        Self {
            i2c,
            clock,
            adc: Ads1115::new(pins::ADS1115_ADDR),
            scale: Ads1232::new(
                GpioLine(pins::ADS1232_SCLK_GPIO),
                GpioLine(pins::ADS1232_DOUT_GPIO),
            ),
            scale_ctl: ScaleControl::new(pins::PCF8574_ADDR),
            heater: HeaterSsr::new(),
            pump: PumpDriver::new(),
            probe: LevelProbe::new(),
            panel: FrontPanel::new(),
            i2c_errors: 0,
        }
    }

    /// Failed ADC or expander transactions since boot.
    pub fn i2c_errors(&self) -> u32 {
        self.i2c_errors
    }

    pub fn heater(&self) -> &HeaterSsr {
        &self.heater
    }

    pub fn pump(&self) -> &PumpDriver {
        &self.pump
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<I: I2c> SensorPort for BoardAdapter<I> {
    fn read_adc(&mut self, channel: AdcChannel) -> i32 {
        match self
            .adc
            .read_single_ended(&mut self.i2c, &mut self.clock, channel)
        {
            Ok(code) => i32::from(code),
            Err(e) => {
                self.i2c_errors = self.i2c_errors.wrapping_add(1);
                warn!("BoardAdapter: ADS1115 {channel:?} read failed: {e:?}");
                FAILED_READ_CODE
            }
        }
    }

    fn read_pin(&mut self, pin: InputPin) -> bool {
        hw_init::gpio_read(pin.gpio())
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<I: I2c> ActuatorPort for BoardAdapter<I> {
    fn set_heater(&mut self, on: bool) {
        self.heater.set(on);
    }

    fn set_pump(&mut self, on: bool) {
        self.pump.set_running(on);
    }

    fn set_pump_power(&mut self, percent: f32) {
        self.pump.set_power(percent);
    }

    fn set_fill_valve(&mut self, open: bool) {
        self.pump.set_fill_valve(open);
    }

    fn set_level_probe(&mut self, enabled: bool) {
        self.probe.set_enabled(enabled);
    }

    fn set_buzzer(&mut self, on: bool) {
        self.panel.set_buzzer(on);
    }

    fn set_led(&mut self, led: Led, on: bool) {
        match led {
            Led::Main => self.panel.set_main(on),
            Led::Heater => self.panel.set_heater(on),
            Led::Water => self.panel.set_water(on),
        }
    }

    fn write_pin(&mut self, pin: OutputPin, high: bool) {
        // Route through the drivers so their shadows stay in step.
        match pin {
            OutputPin::LevelProbeEnable => self.probe.set_enabled(high),
            OutputPin::Buzzer => self.panel.set_buzzer(high),
            OutputPin::LedMain => self.panel.set_main(high),
            OutputPin::LedHeater => self.panel.set_heater(high),
            OutputPin::LedWater => self.panel.set_water(high),
            OutputPin::FillValve => self.pump.set_fill_valve(high),
            OutputPin::PumpRelay => self.pump.set_running(high),
            OutputPin::HeaterSsr => self.heater.set(high),
            OutputPin::PumpTriac => hw_init::gpio_write(pin.gpio(), high),
        }
    }

    fn all_off(&mut self) {
        self.heater.set(false);
        self.pump.stop();
        self.probe.set_enabled(false);
    }
}

// ── ScalePort implementation ──────────────────────────────────

impl<I: I2c> ScalePort for BoardAdapter<I> {
    fn data_ready(&self) -> &DataReady {
        &SCALE_DATA_READY
    }

    fn conversion_available(&mut self) -> bool {
        self.scale.is_ready()
    }

    fn read_conversion(&mut self) -> ScaleCode {
        let code = self.scale.read(&mut self.clock);
        if code == ScaleCode::FullScale {
            // The converter reports full scale after losing its settings
            // (brown-out on the expander); re-send them.
            warn!("BoardAdapter: scale at full scale, re-applying control byte");
            if self.scale_ctl.apply(&mut self.i2c).is_err() {
                self.i2c_errors = self.i2c_errors.wrapping_add(1);
            }
        }
        code
    }

    fn configure(&mut self) {
        if let Err(e) = self.scale_ctl.configure(&mut self.i2c, &mut self.clock) {
            self.i2c_errors = self.i2c_errors.wrapping_add(1);
            warn!("BoardAdapter: scale expander configuration failed: {e:?}");
        }
    }
}

// ── ClockPort implementation ──────────────────────────────────

impl<I: I2c> ClockPort for BoardAdapter<I> {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn delay_ms(&mut self, ms: u32) {
        ClockPort::delay_ms(&mut self.clock, ms);
    }
}
