//! ADS1232 24-bit load-cell ADC and its PCF8574 control expander.
//!
//! DOUT doubles as data-ready: it falls when a conversion is waiting
//! (see `sensors::scale_isr`).  The conversion is clocked out MSB-first
//! with 24 SCLK pulses plus a 25th that forces DOUT high again until the
//! next conversion.
//!
//! Gain, speed, channel and power-down are not wired to the MCU; they sit
//! on a PCF8574 at [`PCF8574_ADDR`](crate::pins::PCF8574_ADDR).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use crate::app::ports::ScaleCode;

/// Positive full-scale code, reported when the input is saturated or the
/// converter lost its configuration.
pub const FULL_SCALE_CODE: i32 = 0x7F_FFFF;

const SCLK_HALF_PERIOD_US: u32 = 1;

/// Expander settle time between configuration writes.
const PCF_SETTLE_MS: u32 = 100;

// PCF8574 bit positions
const PCF_TEMP_BIT: u8 = 0;
const PCF_A0_BIT: u8 = 2;
const PCF_SPEED_BIT: u8 = 4;
const PCF_GAIN1_BIT: u8 = 5;
const PCF_GAIN0_BIT: u8 = 6;
const PCF_PDWN_BIT: u8 = 7;

/// Load-cell input used on this board.
pub const SCALE_CHANNEL: u8 = 2;

/// Sign-extend a 24-bit two's-complement word.
pub fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

// ── Conversion interface ──────────────────────────────────────

pub struct Ads1232<SCLK, DOUT> {
    sclk: SCLK,
    dout: DOUT,
}

impl<SCLK: OutputPin, DOUT: InputPin> Ads1232<SCLK, DOUT> {
    pub fn new(mut sclk: SCLK, dout: DOUT) -> Self {
        // A failed write leaves SCLK where the pin driver put it; the
        // first read re-drives it.
        let _ = sclk.set_low();
        Self { sclk, dout }
    }

    /// DOUT low means a conversion is waiting.
    pub fn is_ready(&mut self) -> bool {
        self.dout.is_low().unwrap_or(false)
    }

    /// Clock out one conversion.  Runs inside a critical section so the
    /// SCLK timing is not stretched by interrupts.
    pub fn read<D: DelayNs>(&mut self, delay: &mut D) -> ScaleCode {
        if !self.is_ready() {
            return ScaleCode::NotReady;
        }

        let raw = critical_section::with(|_| {
            let mut word: u32 = 0;
            for _ in 0..24 {
                let _ = self.sclk.set_high();
                delay.delay_us(SCLK_HALF_PERIOD_US);
                word <<= 1;
                if self.dout.is_high().unwrap_or(false) {
                    word |= 1;
                }
                let _ = self.sclk.set_low();
                delay.delay_us(SCLK_HALF_PERIOD_US);
            }
            let _ = self.sclk.set_high();
            delay.delay_us(SCLK_HALF_PERIOD_US);
            let _ = self.sclk.set_low();
            word
        });

        let value = sign_extend_24(raw);
        if value == FULL_SCALE_CODE {
            ScaleCode::FullScale
        } else {
            ScaleCode::Value(value)
        }
    }
}

// ── Control expander ──────────────────────────────────────────

/// Shadow of the PCF8574 output byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleControl {
    address: u8,
    state: u8,
}

impl ScaleControl {
    pub const fn new(address: u8) -> Self {
        Self { address, state: 0 }
    }

    pub fn set_gain(&mut self, gain: u8) {
        let bits = (1 << PCF_GAIN0_BIT) | (1 << PCF_GAIN1_BIT);
        if gain == 128 {
            self.state |= bits;
        } else {
            self.state &= !bits;
        }
    }

    pub fn set_high_speed(&mut self, high: bool) {
        self.set_bit(PCF_SPEED_BIT, high);
    }

    /// PDWN is active-low.
    pub fn set_power_down(&mut self, down: bool) {
        self.set_bit(PCF_PDWN_BIT, !down);
    }

    pub fn select_channel(&mut self, channel: u8) {
        self.set_bit(PCF_A0_BIT, channel == 2);
    }

    pub fn set_temperature_mode(&mut self, on: bool) {
        self.set_bit(PCF_TEMP_BIT, on);
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    /// Push the shadow byte to the expander.
    pub fn apply<I: I2c>(&self, i2c: &mut I) -> Result<(), I::Error> {
        i2c.write(self.address, &[self.state])
    }

    /// Full bring-up: gain 128, slow speed, load-cell channel, then a
    /// power cycle so the converter restarts with those settings.
    pub fn configure<I: I2c, D: DelayNs>(&mut self, i2c: &mut I, delay: &mut D) -> Result<(), I::Error> {
        self.set_power_down(true);
        self.apply(i2c)?;
        delay.delay_ms(PCF_SETTLE_MS);

        self.set_high_speed(false);
        self.set_gain(128);
        self.select_channel(SCALE_CHANNEL);
        self.set_temperature_mode(false);
        self.apply(i2c)?;
        delay.delay_ms(PCF_SETTLE_MS);

        self.set_power_down(true);
        self.apply(i2c)?;
        delay.delay_ms(PCF_SETTLE_MS);

        self.set_power_down(false);
        self.apply(i2c)
    }

    fn set_bit(&mut self, bit: u8, on: bool) {
        if on {
            self.state |= 1 << bit;
        } else {
            self.state &= !(1 << bit);
        }
    }
}
