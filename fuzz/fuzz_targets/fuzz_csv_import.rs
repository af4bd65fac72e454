//! Fuzz target for CSV import parsing.
//!
//! Arbitrary uploads must parse or be rejected, never panic.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_csv_import -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use phonebook_api::services::csv_codec::parse_import_csv;

fuzz_target!(|data: &[u8]| {
    if let Ok(records) = parse_import_csv(data, 1_000) {
        assert!(records.len() <= 1_000);
        for record in &records {
            let _ = record.require_common_name();
            let _ = record.staged_changes();
        }
    }
});
