//! Fuzz target for search filter construction.
//!
//! Any free text must yield a balanced filter in which the text cannot open
//! or close a clause.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_search_filter -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use phonebook_directory::build_filter;
use phonebook_directory::filter::escape_filter_value;

const BASE: &str = "(&(objectClass=user)(!(objectClass=computer)))";

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let escaped = escape_filter_value(text);
    assert!(!escaped.contains(['(', ')', '*', '\0']));

    let filter = build_filter(BASE, Some(text));
    let mut depth: i64 = 0;
    for ch in filter.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                assert!(depth >= 0, "unbalanced filter: {filter}");
            }
            _ => {}
        }
    }
    assert_eq!(depth, 0, "unbalanced filter: {filter}");
    assert!(filter.starts_with('('));
});
