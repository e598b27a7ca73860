//! Espresso controller firmware: main entry point.
//!
//! Hexagonal architecture around a single cooperative control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BoardAdapter          LogEventSink   NvsAdapter  MonotonicClock│
//! │  (Sensor+Actuator      (EventSink)    (Config)    (Clock)       │
//! │   +Scale+Clock)                                                │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · Safety · Sensor fusion · PID · Profiles         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Interrupts: scale data-ready flag · zero-cross triac gate     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::mpsc;

use anyhow::Result;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use log::{error, info, warn};

use espresso_core::adapters::hardware::BoardAdapter;
use espresso_core::adapters::log_sink::LogEventSink;
use espresso_core::adapters::nvs::NvsAdapter;
use espresso_core::adapters::time::MonotonicClock;
use espresso_core::app::service::AppService;
use espresso_core::drivers::{hw_init, pump, watchdog};
use espresso_core::pins;

/// Yield between ticks so the idle task runs.
const LOOP_YIELD_MS: u32 = 1;

/// Console line length accepted from the serial shell.
const MAX_LINE_LEN: usize = 4096;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Espresso core v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Initialise hardware peripherals ────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Outputs are in an unknown state; stop here and let the
        // watchdog reset the board.
        error!("HAL init failed: {}; halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }

    if let Err(e) = pump::init_gate_timer() {
        error!("Triac gate timer failed: {}; pump runs at full power only", e);
    }
    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {}; continuing without ISRs", e);
    }

    let watchdog = watchdog::Watchdog::new(watchdog::DEFAULT_TIMEOUT_MS);

    let peripherals = Peripherals::take()?;
    let i2c_config = I2cConfig::new().baudrate(pins::I2C_FREQ_HZ.Hz());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio11,
        peripherals.pins.gpio12,
        &i2c_config,
    )?;

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            // Continue without NVS: config will not be persisted this
            // session.  On next reboot, NVS should self-heal.
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = nvs.load_or_default();

    // ── 4. Construct adapters and the app service ─────────────
    let mut hw = BoardAdapter::new(i2c, MonotonicClock::new());
    let mut log_sink = LogEventSink::new();
    let mut app = AppService::new(config);
    let boot_state = app.start(&mut hw, &mut log_sink);
    info!("Boot state: {}", boot_state);

    // ── 5. Serial console reader ──────────────────────────────
    // Lines are handed to the control loop; the reader never touches
    // machine state itself.
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("console".into())
        .stack_size(8 * 1024)
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if line.len() > MAX_LINE_LEN {
                    continue;
                }
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        app.tick(&mut hw, &mut log_sink);
        watchdog.feed();

        while let Ok(line) = line_rx.try_recv() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match app.handle_line(line, &mut hw, &mut log_sink) {
                Ok(reply) => info!("> {}: {}", line, reply),
                Err(e) => warn!("> {}: {}", line, e),
            }
        }

        app.auto_save_if_needed(&nvs);
        FreeRtos::delay_ms(LOOP_YIELD_MS);
    }
}
