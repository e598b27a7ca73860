//! Fuzz target: console command and setting parsers
//!
//! Feeds arbitrary UTF-8 lines through `parse_command`, and every line
//! that parses as `set` through the settings table against a default
//! config.
//!
//! Invariants checked:
//! - No panics under any input
//! - A refused setting leaves the config untouched
//!
//! cargo fuzz run fuzz_command_line

#![no_main]

use espresso_core::app::commands::{AppCommand, apply_setting, parse_command};
use espresso_core::config::SystemConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(AppCommand::Set(setting)) = parse_command(line) {
        let mut config = SystemConfig::default();
        if apply_setting(&mut config, &setting).is_err() {
            assert_eq!(config, SystemConfig::default(), "refused setting mutated config");
        }
    }

    // The raw line straight into the settings table as well.
    let mut config = SystemConfig::default();
    let _ = apply_setting(&mut config, line);
});
