//! Monotonic clock and blocking delays.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//!   Sub-millisecond delays spin in ROM (`Ets`); longer ones yield to
//!   FreeRTOS.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` and
//!   `std::thread::sleep` for host-side testing and simulation.

use embedded_hal::delay::DelayNs;

use crate::app::ports::ClockPort;

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        // SAFETY: read-only query of the system timer.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since construction (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl ClockPort for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.uptime_us() / 1_000
    }

    fn delay_ms(&mut self, ms: u32) {
        DelayNs::delay_ms(self, ms);
    }
}

impl DelayNs for MonotonicClock {
    #[cfg(target_os = "espidf")]
    fn delay_ns(&mut self, ns: u32) {
        esp_idf_svc::hal::delay::Ets::delay_us(ns.div_ceil(1_000));
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
