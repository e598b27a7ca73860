//! Fuzz target: persisted config blob
//!
//! Decodes arbitrary bytes as the postcard-encoded `SystemConfig` that the
//! NVS adapter stores, the way a corrupted flash page would be read back.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Any blob that decodes and validates re-encodes to a stable blob
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use espresso_core::config::SystemConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = postcard::from_bytes::<SystemConfig>(data) else {
        return;
    };
    if config.validate().is_err() {
        return;
    }

    let bytes = postcard::to_allocvec(&config).expect("valid config encodes");
    let back: SystemConfig = postcard::from_bytes(&bytes).expect("re-encoded blob decodes");
    // The encoding is a fixed point.
    let again = postcard::to_allocvec(&back).expect("valid config encodes");
    assert_eq!(again, bytes);
});
