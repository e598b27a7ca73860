//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                        |
//! |-------------|--------------|------------------------------------|
//! | `hardware`  | SensorPort   | ADS1115, GPIO inputs               |
//! |             | ActuatorPort | SSR, pump relay/triac, valve, LEDs |
//! |             | ScalePort    | ADS1232 + PCF8574 expander         |
//! |             | ClockPort    | via `time`                         |
//! | `log_sink`  | EventSink    | Serial log output                  |
//! | `nvs`       | ConfigPort   | NVS / in-memory store              |
//! | `time`      | ClockPort    | ESP32 system timer                 |

pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
