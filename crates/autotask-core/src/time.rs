//! Timestamp and duration encoding shared by every crate that touches the
//! `tasks` table.
//!
//! Timestamps are written as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so SQLite's text comparison orders them chronologically. Durations
//! are written as whole microseconds.

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};

use crate::error::{AutotaskError, Result};

/// Render `ts` in the fixed-width storage format.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Drop sub-microsecond precision so a value survives a storage round trip unchanged.
pub fn to_storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Parse a timestamp previously written by [`format_ts`] (any RFC 3339 is accepted).
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AutotaskError::InvalidTimestamp(format!("{raw}: {e}")))
}

/// Microseconds in `d`, saturating at `i64::MAX`.
pub fn duration_to_micros(d: TimeDelta) -> i64 {
    d.num_microseconds().unwrap_or(i64::MAX)
}

pub fn micros_to_duration(us: i64) -> TimeDelta {
    TimeDelta::microseconds(us)
}

/// Convert a `std::time::Duration` (config values) into a chrono delta.
pub fn from_std(d: std::time::Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(d).map_err(|e| AutotaskError::InvalidDuration(e.to_string()))
}
