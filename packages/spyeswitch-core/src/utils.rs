//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parses a `T`/`F` flag as stored in the settings file.
///
/// Surrounding whitespace is ignored; anything else is `None`.
#[must_use]
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "T" => Some(true),
        "F" => Some(false),
        _ => None,
    }
}

/// Formats a flag the way the settings file stores it.
#[must_use]
pub fn format_flag(value: bool) -> &'static str {
    if value {
        "T"
    } else {
        "F"
    }
}
