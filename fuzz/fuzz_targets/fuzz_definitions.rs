//! Fuzz target: `parse_definitions`
//!
//! Feeds arbitrary text to the button definitions parser.
//!
//! Invariants checked:
//! - No panics under any input
//! - Every returned entry opens at least one and at most 8 lines
//! - CPLD entries always come before GPIO entries
//!
//! cargo fuzz run fuzz_definitions

#![no_main]

use bmc_buttons::config::parse_definitions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(configs) = parse_definitions(text, 0) else {
        return;
    };

    let mut seen_gpio = false;
    for cfg in &configs {
        let n = cfg.line_count();
        assert!((1..=8).contains(&n), "{} has {} lines", cfg.form_factor, n);
        if cfg.is_cpld() {
            assert!(!seen_gpio, "cpld entry {} after a gpio entry", cfg.form_factor);
        } else {
            seen_gpio = true;
        }
    }
});
