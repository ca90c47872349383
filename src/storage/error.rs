use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures of an [ActivityStore](super::activity_storage::ActivityStore). None of them are
/// fatal to the interactive session, the caller reports them and carries on.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The existing document couldn't be parsed. It is left untouched.
    #[error("{path:?} doesn't contain a valid activity list, refusing to overwrite it: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error on {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to serialize activities: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid {field} '{value}' in saved activity: {reason}")]
    InvalidRecord {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>) -> impl FnOnce(csv::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Csv { path, source }
    }
}
