//! Time conversion helpers

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert seconds to whole milliseconds, rounding to nearest
///
/// Negative and non-finite input maps to zero.
pub fn secs_to_millis(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * 1000.0).round() as u64
}

/// Convert a file timestamp to UTC
pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Cutoff instant for "older than `days`" sweeps
pub fn cutoff_days_ago(days: u32) -> DateTime<Utc> {
    now() - chrono::Duration::days(i64::from(days))
}
