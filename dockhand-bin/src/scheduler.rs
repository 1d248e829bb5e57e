//! Hourly backup scheduling with same-clock-hour dedup.
//!
//! The agent ticks frequently and asks `due` whether a run should
//! trigger. Recording the clock-hour key of the last run prevents a
//! second run within the same calendar hour, including the interplay
//! with a startup backup.

use chrono::{DateTime, Local, Timelike};

/// Runs trigger at minute 5 of a configured hour, not on the hour.
pub const TRIGGER_MINUTE: u32 = 5;

/// Key identifying the clock hour of a run, e.g. "2026-08-06T14".
pub fn hour_key(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H").to_string()
}

/// True when a backup should trigger at `now`: the hour is configured,
/// the trigger minute has been reached and no run has been recorded for
/// this clock hour yet.
pub fn due(now: DateTime<Local>, hours: &[u32], last_run: Option<&str>) -> bool {
    hours.contains(&now.hour())
        && now.minute() >= TRIGGER_MINUTE
        && last_run != Some(hour_key(now).as_str())
}
