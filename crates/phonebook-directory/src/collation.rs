//! Russian collation for list ordering.
//!
//! Multi-level comparison: letters first (ignoring case and the е/ё
//! distinction), then е before ё, then lowercase before uppercase.
//! Punctuation and spaces sort before digits, digits before Cyrillic,
//! Cyrillic before Latin, Latin before everything else.

use std::cmp::Ordering;

use crate::record::DirectoryRecord;

const CYRILLIC_ALPHABET: &str = "абвгдежзийклмнопрстуфхцчшщъыьэюя";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Script {
    Punctuation,
    Digit,
    Cyrillic,
    Latin,
    Other,
}

/// Sort key; compares the way a Russian-locale reader expects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollationKey {
    primary: Vec<(Script, u32)>,
    secondary: Vec<u8>,
    tertiary: Vec<u8>,
}

impl CollationKey {
    pub fn new(text: &str) -> Self {
        let mut key = Self {
            primary: Vec::with_capacity(text.len()),
            secondary: Vec::with_capacity(text.len()),
            tertiary: Vec::with_capacity(text.len()),
        };

        for ch in text.chars() {
            let lower = ch.to_lowercase().next().unwrap_or(ch);
            let (base, accent) = match lower {
                'ё' => ('е', 1),
                other => (other, 0),
            };
            key.primary.push(primary_weight(base));
            key.secondary.push(accent);
            key.tertiary.push(u8::from(ch != lower));
        }
        key
    }
}

fn primary_weight(ch: char) -> (Script, u32) {
    if let Some(pos) = CYRILLIC_ALPHABET.chars().position(|c| c == ch) {
        return (Script::Cyrillic, pos as u32);
    }
    if ('\u{0400}'..='\u{04FF}').contains(&ch) {
        return (Script::Cyrillic, 100 + ch as u32);
    }
    if ch.is_ascii_lowercase() {
        return (Script::Latin, ch as u32);
    }
    if ch.is_ascii_digit() {
        return (Script::Digit, ch as u32);
    }
    if ch.is_whitespace() || ch.is_ascii_punctuation() {
        return (Script::Punctuation, ch as u32);
    }
    (Script::Other, ch as u32)
}

/// Compare two strings in Russian collation order.
pub fn compare(a: &str, b: &str) -> Ordering {
    CollationKey::new(a).cmp(&CollationKey::new(b))
}

/// Stable sort by display name, else common name, else surname.
pub fn sort_records(records: &mut [DirectoryRecord]) {
    records.sort_by_cached_key(|record| CollationKey::new(record.sort_name()));
}
