//! Fuzz target: `EspressoProfile::from_json` and `target_at`
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Imported profiles never exceed `MAX_PROFILE_STEPS`
//! - The shot cursor never moves backwards while progress rises
//!
//! cargo fuzz run fuzz_profile_json

#![no_main]

use espresso_core::profile::{EspressoProfile, MAX_PROFILE_STEPS, ShotCursor};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(profile) = EspressoProfile::from_json(json) else {
        return;
    };
    assert!(profile.steps.len() <= MAX_PROFILE_STEPS);

    let mut cursor = ShotCursor::new();
    let mut last_index = 0;
    for tenth in 0..600u16 {
        let _ = profile.target_at(&mut cursor, f32::from(tenth) / 10.0);
        assert!(cursor.index() >= last_index, "cursor rewound");
        assert!(cursor.index() <= profile.steps.len());
        last_index = cursor.index();
    }

    // Export must be importable again.
    let back = EspressoProfile::from_json(&profile.to_json());
    assert!(back.is_ok());
});
