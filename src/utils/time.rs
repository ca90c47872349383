use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Format used for dates inside saved activity records.
pub const RECORD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used when summarizing a finished session.
pub const SUMMARY_DATE_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of converting a start date to a string in saved records.
pub fn date_to_record_string(date: &DateTime<Local>) -> String {
    date.format(RECORD_DATE_FORMAT).to_string()
}

/// Inverse of [date_to_record_string]. Ambiguous local times (DST folds) resolve to the
/// earlier instant.
pub fn record_string_to_date(value: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value, RECORD_DATE_FORMAT)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("{value} doesn't exist in the local timezone"))
}

/// Renders a duration as `1h2m3s`, `2m0s` or `45s`. Sub-second precision is dropped.
pub fn format_duration(v: Duration) -> String {
    let seconds = v.as_secs();
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parses durations produced by [format_duration].
pub fn parse_duration(value: &str) -> Result<Duration> {
    if value.is_empty() {
        return Err(anyhow!("Empty duration"));
    }

    let mut total = 0u64;
    let mut number = String::new();
    let mut last_unit = None;
    for c in value.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }

        let (rank, multiplier) = match c {
            'h' => (0, 3600),
            'm' => (1, 60),
            's' => (2, 1),
            _ => return Err(anyhow!("Unexpected character '{c}' in duration {value}")),
        };
        if number.is_empty() || last_unit.is_some_and(|last| last >= rank) {
            return Err(anyhow!("Malformed duration {value}"));
        }
        total = number
            .parse::<u64>()?
            .checked_mul(multiplier)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| anyhow!("Duration {value} is too large"))?;
        number.clear();
        last_unit = Some(rank);
    }

    if !number.is_empty() || last_unit.is_none() {
        return Err(anyhow!("Duration {value} is missing a unit"));
    }
    Ok(Duration::from_secs(total))
}
