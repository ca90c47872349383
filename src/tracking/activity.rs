use std::time::Duration;

use chrono::{DateTime, Local};

use crate::utils::time::{format_duration, SUMMARY_DATE_FORMAT};

/// A finished tracking session. Constructed once the user stops tracking and handed over to
/// storage by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub name: String,
    pub duration: Duration,
    /// Moment the session was started.
    pub date: DateTime<Local>,
}

impl Activity {
    pub fn new(name: String, duration: Duration, date: DateTime<Local>) -> Self {
        Self {
            name,
            duration,
            date,
        }
    }

    /// Line shown to the user after the activity was saved.
    pub fn summary(&self) -> String {
        format!(
            "Tracked activity '{}' for {} on {}.",
            self.name,
            format_duration(self.duration),
            self.date.format(SUMMARY_DATE_FORMAT)
        )
    }
}
