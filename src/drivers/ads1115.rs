//! ADS1115 16-bit I²C ADC: boiler and HX thermistors, pressure transducer.
//!
//! Single-shot conversions at ±4.096 V full scale, 128 SPS.  The bus is
//! shared with the scale's control expander, so the driver borrows it per
//! call instead of owning it.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::pins::AdcChannel;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Start a single conversion (write) / conversion idle (read).
const OS_BIT: u16 = 1 << 15;
/// PGA = ±4.096 V.
const PGA_4_096V: u16 = 0b001 << 9;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
/// 128 samples per second.
const DR_128SPS: u16 = 0b100 << 5;
/// Comparator disabled.
const COMP_QUE_DISABLE: u16 = 0b11;

/// One conversion at 128 SPS takes ~7.8 ms.
const CONVERSION_WAIT_US: u32 = 8_000;
/// Extra polls of the OS bit before giving up.
const MAX_BUSY_POLLS: u8 = 5;
const BUSY_POLL_US: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ads1115Error<E> {
    I2c(E),
    /// The conversion never finished.
    Busy,
}

pub struct Ads1115 {
    address: u8,
}

impl Ads1115 {
    pub const fn new(address: u8) -> Self {
        Self { address }
    }

    /// Config register value for a single-ended single-shot read.
    pub const fn config_for(channel: AdcChannel) -> u16 {
        let mux = (0b100 | channel as u16) << 12;
        OS_BIT | mux | PGA_4_096V | MODE_SINGLE_SHOT | DR_128SPS | COMP_QUE_DISABLE
    }

    /// Run one single-ended conversion on `channel`.
    pub fn read_single_ended<I, D>(
        &self,
        i2c: &mut I,
        delay: &mut D,
        channel: AdcChannel,
    ) -> Result<i16, Ads1115Error<I::Error>>
    where
        I: I2c,
        D: DelayNs,
    {
        let [hi, lo] = Self::config_for(channel).to_be_bytes();
        i2c.write(self.address, &[REG_CONFIG, hi, lo])
            .map_err(Ads1115Error::I2c)?;
        delay.delay_us(CONVERSION_WAIT_US);

        let mut polls = 0;
        while !self.conversion_done(i2c)? {
            if polls >= MAX_BUSY_POLLS {
                return Err(Ads1115Error::Busy);
            }
            polls += 1;
            delay.delay_us(BUSY_POLL_US);
        }

        let mut buf = [0u8; 2];
        i2c.write_read(self.address, &[REG_CONVERSION], &mut buf)
            .map_err(Ads1115Error::I2c)?;
        Ok(i16::from_be_bytes(buf))
    }

    fn conversion_done<I: I2c>(&self, i2c: &mut I) -> Result<bool, Ads1115Error<I::Error>> {
        let mut buf = [0u8; 2];
        i2c.write_read(self.address, &[REG_CONFIG], &mut buf)
            .map_err(Ads1115Error::I2c)?;
        Ok(u16::from_be_bytes(buf) & OS_BIT != 0)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeBus, NoDelay};
    use super::*;

    #[test]
    fn config_selects_single_ended_mux() {
        assert_eq!(Ads1115::config_for(AdcChannel::Boiler), 0xC383);
        assert_eq!(Ads1115::config_for(AdcChannel::Pressure), 0xF383);
    }

    #[test]
    fn reads_conversion_register() {
        let mut bus = FakeBus {
            conversion: 12_345,
            busy_reads: 2,
            ..FakeBus::default()
        };
        let adc = Ads1115::new(0x48);
        let code = adc.read_single_ended(&mut bus, &mut NoDelay, AdcChannel::Hx);
        assert_eq!(code, Ok(12_345));
        assert_eq!(bus.writes[0], (0x48, vec![REG_CONFIG, 0xD3, 0x83]));
    }

    #[test]
    fn stuck_conversion_reports_busy() {
        let mut bus = FakeBus {
            busy_reads: 100,
            ..FakeBus::default()
        };
        let adc = Ads1115::new(0x48);
        assert_eq!(
            adc.read_single_ended(&mut bus, &mut NoDelay, AdcChannel::Boiler),
            Err(Ads1115Error::Busy)
        );
    }

    #[test]
    fn negative_codes_pass_through() {
        let mut bus = FakeBus {
            conversion: -3,
            ..FakeBus::default()
        };
        let adc = Ads1115::new(0x48);
        assert_eq!(
            adc.read_single_ended(&mut bus, &mut NoDelay, AdcChannel::Spare),
            Ok(-3)
        );
    }
}
