//! Vibratory pump and boiler fill valve.
//!
//! The pump sits behind a relay and a triac phase-angle dimmer.  A
//! zero-cross interrupt arms a one-shot timer; when it fires the triac
//! gate is pulsed, so the later in the half cycle the pulse comes, the
//! less power reaches the pump.  Brightness 255 fires right after the
//! crossing, brightness 0 never fires.
//!
//! ## Safety contract
//!
//! This driver is a dumb actuator.  The FSM decides when the pump may
//! run; ERROR and DEBUG entry switch everything off through the service.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the relay GPIOs via hw_init helpers and gates the
//! triac from an esp_timer callback.  On host/test: tracks state
//! in-memory and writes the simulated pin bank.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::drivers::hw_init;
use crate::pins;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Mains half-cycle length at 50 Hz.
pub const HALF_CYCLE_US: u32 = 10_000;

/// Gate pulses are never scheduled closer to the next crossing than this.
const GATE_GUARD_US: u32 = 200;
/// Gate pulse width.
#[cfg(target_os = "espidf")]
const GATE_PULSE_US: u32 = 100;

/// Dimmer level read by the zero-cross ISR.
static DIMMER_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Map a 0–100 % power request onto the 8-bit dimmer scale.
pub fn brightness_from_percent(percent: f32) -> u8 {
    if !percent.is_finite() {
        return 0;
    }
    (percent.clamp(0.0, 100.0) * 255.0 / 100.0).round() as u8
}

/// Delay from the zero crossing to the gate pulse, or `None` when the
/// triac should stay off for this half cycle.
pub fn gate_delay_us(brightness: u8, half_cycle_us: u32) -> Option<u32> {
    if brightness == 0 {
        return None;
    }
    let usable = half_cycle_us.saturating_sub(GATE_GUARD_US);
    Some(usable * u32::from(255 - brightness) / 255)
}

// ── Zero-cross / gate timer (target) ──────────────────────────

#[cfg(target_os = "espidf")]
static mut GATE_TIMER: esp_timer_handle_t = core::ptr::null_mut();

/// SAFETY: GATE_TIMER is written once in `init_gate_timer()` before the
/// zero-cross interrupt is enabled.
#[cfg(target_os = "espidf")]
unsafe fn gate_timer() -> esp_timer_handle_t {
    unsafe { GATE_TIMER }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn gate_timer_cb(_arg: *mut core::ffi::c_void) {
    hw_init::gpio_write(pins::PUMP_TRIAC_GPIO, true);
    // SAFETY: esp_rom_delay_us is a busy-wait; the pulse is far shorter
    // than the half cycle.
    unsafe { esp_rom_delay_us(GATE_PULSE_US) };
    hw_init::gpio_write(pins::PUMP_TRIAC_GPIO, false);
}

/// Create the one-shot gate timer.  Call before `init_isr_service()`.
#[cfg(target_os = "espidf")]
pub fn init_gate_timer() -> Result<(), hw_init::HwInitError> {
    // SAFETY: GATE_TIMER is written here once at boot from the main task
    // before the zero-cross ISR that reads it is registered.
    unsafe {
        let args = esp_timer_create_args_t {
            callback: Some(gate_timer_cb),
            arg: core::ptr::null_mut(),
            dispatch_method: esp_timer_dispatch_t_ESP_TIMER_ISR,
            name: b"triac\0".as_ptr() as *const _,
            skip_unhandled_events: true,
        };
        let ret = esp_timer_create(&args, &raw mut GATE_TIMER);
        if ret != ESP_OK {
            return Err(hw_init::HwInitError::TimerCreateFailed(ret));
        }
    }
    log::info!("pump: triac gate timer ready");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_gate_timer() -> Result<(), hw_init::HwInitError> {
    log::info!("pump(sim): triac gate timer skipped");
    Ok(())
}

/// Zero-cross ISR body: schedule this half cycle's gate pulse.
#[cfg(target_os = "espidf")]
pub fn on_zero_cross() {
    let Some(delay) = gate_delay_us(DIMMER_LEVEL.load(Ordering::Relaxed), HALF_CYCLE_US) else {
        return;
    };
    // SAFETY: gate_timer() contract; esp_timer_start_once is ISR-safe when
    // the timer uses ISR dispatch.  A still-armed timer returns an error
    // and the pulse for this half cycle is skipped.
    unsafe {
        let t = gate_timer();
        if !t.is_null() {
            esp_timer_start_once(t, u64::from(delay.max(1)));
        }
    }
}

// ── Driver ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Stopped,
    Running { brightness: u8 },
}

pub struct PumpDriver {
    state: PumpState,
    relay_on: bool,
    brightness: u8,
    fill_valve_open: bool,
}

impl Default for PumpDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpDriver {
    pub fn new() -> Self {
        let mut driver = Self {
            state: PumpState::Stopped,
            relay_on: false,
            brightness: 255,
            fill_valve_open: false,
        };
        driver.set_relay_hw(false);
        driver.set_fill_valve(false);
        driver.set_brightness_hw(255);
        driver
    }

    /// Switch the pump relay.
    pub fn set_running(&mut self, on: bool) {
        if on != self.relay_on {
            self.set_relay_hw(on);
            self.relay_on = on;
        }
        self.state = if on {
            PumpState::Running {
                brightness: self.brightness,
            }
        } else {
            PumpState::Stopped
        };
    }

    /// Set the dimmer from a 0–100 % request.
    pub fn set_power(&mut self, percent: f32) {
        let b = brightness_from_percent(percent);
        if b != self.brightness {
            self.set_brightness_hw(b);
            self.brightness = b;
        }
        if self.relay_on {
            self.state = PumpState::Running { brightness: b };
        }
    }

    pub fn set_fill_valve(&mut self, open: bool) {
        hw_init::gpio_write(pins::FILL_VALVE_GPIO, open);
        self.fill_valve_open = open;
    }

    /// Relay and valve off.
    pub fn stop(&mut self) {
        self.set_running(false);
        self.set_fill_valve(false);
    }

    fn set_relay_hw(&self, on: bool) {
        hw_init::gpio_write(pins::PUMP_RELAY_GPIO, on);
    }

    fn set_brightness_hw(&self, brightness: u8) {
        DIMMER_LEVEL.store(brightness, Ordering::Relaxed);
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, PumpState::Stopped)
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn fill_valve_open(&self) -> bool {
        self.fill_valve_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_maps_to_8_bit_scale() {
        assert_eq!(brightness_from_percent(0.0), 0);
        assert_eq!(brightness_from_percent(50.0), 128);
        assert_eq!(brightness_from_percent(100.0), 255);
        assert_eq!(brightness_from_percent(140.0), 255);
        assert_eq!(brightness_from_percent(f32::NAN), 0);
    }

    #[test]
    fn gate_delay_shrinks_with_brightness() {
        assert_eq!(gate_delay_us(0, HALF_CYCLE_US), None);
        assert_eq!(gate_delay_us(255, HALF_CYCLE_US), Some(0));
        let half = gate_delay_us(128, HALF_CYCLE_US).unwrap_or_default();
        let low = gate_delay_us(50, HALF_CYCLE_US).unwrap_or_default();
        assert!(low > half);
        assert!(low < HALF_CYCLE_US - GATE_GUARD_US);
    }

    #[test]
    fn relay_and_power_track_state() {
        let mut p = PumpDriver::new();
        assert!(!p.is_running());
        p.set_power(60.0);
        p.set_running(true);
        assert_eq!(p.state(), PumpState::Running { brightness: 153 });
        p.set_power(100.0);
        assert_eq!(p.state(), PumpState::Running { brightness: 255 });
        p.set_fill_valve(true);
        p.stop();
        assert!(!p.is_running());
        assert!(!p.fill_valve_open());
    }
}
