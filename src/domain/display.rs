//! Operator-facing formatting
//!
//! Backend timestamps are UTC; operators read them in the site timezone
//! (UTC+7 in production).

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Placeholder for an absent value
pub const MISSING: &str = "-";

/// `dd/mm/yyyy HH:MM:SS` in the given UTC offset; absent timestamps render as `-`
pub fn format_display_time(ts: Option<DateTime<Utc>>, utc_offset_hours: i32) -> String {
    let Some(ts) = ts else {
        return MISSING.to_string();
    };
    // Out-of-range offsets fall back to UTC
    let offset = FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix());
    ts.with_timezone(&offset).format("%d/%m/%Y %H:%M:%S").to_string()
}

/// Content URL of a stored picture
pub fn picture_url(base_url: &str, picture_id: i64) -> String {
    format!("{}/Picture/{}/file", base_url.trim_end_matches('/'), picture_id)
}

/// Text for an optional field
pub fn or_missing(value: Option<&str>) -> &str {
    value.unwrap_or(MISSING)
}
