//! "How long ago" labels for the last refresh.

use chrono::{DateTime, Local, TimeZone, Utc};
use std::fmt::Display;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Format the age of `timestamp` at `now`, in the local time zone.
///
/// `"14:03:27 - Just Now"`, `"14:03:27 - 40 Secs Ago"`, `"09:00:00 - 2 Hours Ago"`.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_age_in(timestamp, now, &Local)
}

/// [`format_age`] with the clock-time prefix rendered in `tz`.
pub fn format_age_in<Tz>(timestamp: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let clock = timestamp.with_timezone(tz).format("%H:%M:%S");
    format!("{clock} - {}", describe_elapsed((now - timestamp).num_seconds()))
}

/// The part after the dash. Negative input (clock skew) counts as zero.
pub fn describe_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds < MINUTE {
        // Whole tens of seconds so the label does not flicker every tick.
        match seconds / 10 * 10 {
            0 => "Just Now".to_string(),
            n => format!("{n} Secs Ago"),
        }
    } else if seconds < HOUR {
        format!("{} Minutes Ago", seconds / MINUTE)
    } else if seconds < DAY {
        format!("{} Hours Ago", seconds / HOUR)
    } else {
        format!("{} Days Ago", seconds / DAY)
    }
}
