//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the controller if the control loop
//! stalls.  With the heater and pump live, a hung loop must end in a reset
//! that boots with every actuator off.
//!
//! The control loop calls `feed()` once per tick.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

/// Reset timeout used by the firmware binary.
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    timeout_ms: u32,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: core::cell::Cell<u32>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.
    pub fn new(timeout_ms: u32) -> Self {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: reconfigure/add are called once from the main task
            // before the control loop starts.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", timeout_ms);
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self {
                    timeout_ms,
                    subscribed,
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("Watchdog(sim): {} ms timeout, no-op", timeout_ms);
            Self {
                timeout_ms,
                feeds: core::cell::Cell::new(0),
            }
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Feed the watchdog. Must be called at least once per timeout.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: resets the calling task's TWDT entry only.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.feeds.set(self.feeds.get().wrapping_add(1));
    }

    /// Feeds since construction (host only).
    #[cfg(not(target_os = "espidf"))]
    pub fn feed_count(&self) -> u32 {
        self.feeds.get()
    }
}
