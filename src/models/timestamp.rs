//! Timestamp parsing for stored configuration

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Parse a stored fetch timestamp.
///
/// Accepts RFC 3339 and zone-less ISO 8601 (interpreted as local time). Empty or unparseable
/// values mean "never fetched".
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}
