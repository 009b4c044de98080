use chrono::{DateTime, Utc};

/// Current Unix time in seconds.
pub fn now_ts() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Render a Unix timestamp (seconds) as RFC 3339, or the raw number if it is out of range.
pub fn iso_from_unix(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| secs.to_string())
}
