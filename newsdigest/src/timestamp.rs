//! Tolerant date parsing for the heterogeneous date strings found in feeds and news pages.
//!
//! Everything is normalized to UTC. Strings without an offset are taken to be UTC already.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Formats carrying an explicit offset, tried after RFC 3339 / RFC 2822.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
];

/// Date + time without offset (interpreted as UTC).
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%B %d, %Y %I:%M %p",
];

/// Date only (midnight UTC).
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%A, %B %d, %Y",
    "%a, %B %d, %Y",
    "%m/%d/%Y",
];

/// Parse `text` into a UTC timestamp, returning `fallback` when nothing matches.
///
/// The fallback is a deliberate, lossy choice: an item with an unreadable date is still
/// worth keeping, stamped with the collection time instead of being dropped.
pub fn parse_timestamp(text: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    try_parse_timestamp(text).unwrap_or(fallback)
}

/// Best-effort parse without a fallback.
pub fn try_parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(cleaned, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // "2025-01-01 12:00 UTC" and friends: the suffix only restates the default zone
    let naive_text = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|suffix| cleaned.strip_suffix(suffix))
        .map(str::trim_end)
        .unwrap_or(cleaned);

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(naive_text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }

    None
}

/// Storage representation: RFC 3339 in UTC with a `+00:00` offset, sub-second digits
/// only when present. Uniform offset keeps lexical order equal to chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
