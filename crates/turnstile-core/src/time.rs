//! Timestamp helpers.
//!
//! All times are UTC. Storage backends persist them as Unix milliseconds.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::CoreError;

/// An absolute point in time.
pub type Timestamp = DateTime<Utc>;

/// Convert a timestamp to Unix milliseconds.
pub fn to_millis(at: Timestamp) -> i64 {
    at.timestamp_millis()
}

/// Convert Unix milliseconds back into a timestamp.
pub fn from_millis(ms: i64) -> Result<Timestamp, CoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(CoreError::TimestampOutOfRange(ms))
}

/// Calendar date used in subscriber-facing texts (`YYYY-MM-DD`).
pub fn format_date(at: Timestamp) -> String {
    at.format("%Y-%m-%d").to_string()
}
