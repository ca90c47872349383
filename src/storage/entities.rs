use serde::{Deserialize, Serialize};

use crate::{
    tracking::activity::Activity,
    utils::time::{date_to_record_string, format_duration, parse_duration, record_string_to_date},
};

use super::error::StoreError;

/// The struct used for storing activities on the disk. Both fields besides the name are kept
/// pre-formatted, so CSV and JSON files read the same way a person would write them.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityRecord {
    pub name: String,
    pub duration: String,
    pub date: String,
}

impl From<&Activity> for ActivityRecord {
    fn from(activity: &Activity) -> Self {
        ActivityRecord {
            name: activity.name.clone(),
            duration: format_duration(activity.duration),
            date: date_to_record_string(&activity.date),
        }
    }
}

impl ActivityRecord {
    /// Parses formatted fields back. Sub-second precision is lost on save, so the result
    /// matches the original activity only up to whole seconds.
    pub fn to_activity(&self) -> Result<Activity, StoreError> {
        let duration = parse_duration(&self.duration).map_err(|e| StoreError::InvalidRecord {
            field: "duration",
            value: self.duration.clone(),
            reason: e.to_string(),
        })?;
        let date = record_string_to_date(&self.date).map_err(|e| StoreError::InvalidRecord {
            field: "date",
            value: self.date.clone(),
            reason: e.to_string(),
        })?;
        Ok(Activity::new(self.name.clone(), duration, date))
    }
}
