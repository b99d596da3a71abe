//! Timestamp normalization and latest-activity comparison.
//!
//! The local store writes `YYYY-MM-DD HH:MM:SS` while the cloud returns
//! ISO-8601 with an offset. Both are compared as UTC instants.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const SPACE_SEPARATED_LEN: usize = 19;

/// Normalize a timestamp string to ISO-8601.
///
/// The space-separated form gains a `T` separator and a `Z` suffix; ISO
/// strings pass through. Returns `None` for empty or unparseable input.
pub fn normalize(ts: &str) -> Option<String> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }

    let candidate = if ts.len() >= SPACE_SEPARATED_LEN && ts.as_bytes()[10] == b' ' {
        let mut iso = format!("{}T{}", &ts[..10], &ts[11..]);
        if !has_offset(&iso) {
            iso.push('Z');
        }
        iso
    } else {
        ts.to_string()
    };

    parse_millis(&candidate).map(|_| candidate)
}

/// Parse a timestamp into Unix milliseconds.
pub fn to_epoch_millis(ts: &str) -> Option<i64> {
    normalize(ts).and_then(|normalized| parse_millis(&normalized))
}

/// Maximum instant among the parseable inputs.
pub fn latest_of<'a>(timestamps: impl IntoIterator<Item = Option<&'a str>>) -> Option<i64> {
    timestamps
        .into_iter()
        .flatten()
        .filter_map(to_epoch_millis)
        .max()
}

/// A parsed instant together with its normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub millis: i64,
    pub text: String,
}

impl Stamp {
    pub fn parse(ts: &str) -> Option<Self> {
        let text = normalize(ts)?;
        let millis = parse_millis(&text)?;
        Some(Self { millis, text })
    }
}

/// Latest of the given timestamps, keeping its text for watermarks.
pub fn latest_stamp<'a>(timestamps: impl IntoIterator<Item = Option<&'a str>>) -> Option<Stamp> {
    timestamps
        .into_iter()
        .flatten()
        .filter_map(Stamp::parse)
        .max_by_key(|stamp| stamp.millis)
}

/// Replace `current` when `next` is strictly later.
pub fn keep_latest(current: &mut Option<Stamp>, next: Option<Stamp>) {
    let Some(next) = next else {
        return;
    };
    match current {
        Some(existing) if existing.millis >= next.millis => {}
        _ => *current = Some(next),
    }
}

fn has_offset(iso: &str) -> bool {
    if iso.ends_with('Z') || iso.ends_with('z') {
        return true;
    }
    iso.get(SPACE_SEPARATED_LEN..)
        .is_some_and(|tail| tail.contains('+') || tail.contains('-'))
}

fn parse_millis(ts: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return Some(parsed.timestamp_millis());
    }
    if let Ok(parsed) = DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f%#z") {
        return Some(parsed.timestamp_millis());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
}
