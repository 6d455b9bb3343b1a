//! Timestamp decoding shared by both transcript formats
//!
//! Log writers disagree on precision and offset notation, so decoding tries
//! an ordered list of formats and keeps the first that succeeds. Anything
//! unparseable becomes `None`, the zero timestamp.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format: whole seconds, always UTC.
pub const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type Attempt = fn(&str) -> Option<DateTime<Utc>>;

/// Tried in order; the first success wins.
const ATTEMPTS: &[Attempt] = &[rfc3339, offset_without_colon, naive_utc];

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn offset_without_colon(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn naive_utc(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Decode a log timestamp. Empty or unrecognized input yields `None`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    ATTEMPTS.iter().find_map(|attempt| attempt(s))
}

/// Encode for storage; the zero timestamp is stored as `''`.
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format(STORAGE_FORMAT).to_string())
        .unwrap_or_default()
}
