use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use clap::ValueEnum;

use crate::tracking::activity::Activity;

use super::{
    csv_storage::CsvActivityStore, entities::ActivityRecord, error::StoreError,
    json_storage::JsonActivityStore,
};

/// Interface for abstracting storage of finished activities. Stores are append-only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Saves one finished activity after all previously saved ones.
    async fn append(&self, activity: Activity) -> Result<(), StoreError>;

    /// Returns every saved activity, oldest first. A missing file means nothing was saved yet.
    async fn load_all(&self) -> Result<Vec<ActivityRecord>, StoreError>;
}

/// Layout of the activity log on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageFormat {
    /// Comma separated rows appended to the end of the file.
    Csv,
    /// An indented array rewritten in full on every save.
    Json,
}

impl StorageFormat {
    pub fn default_file_name(self) -> &'static str {
        match self {
            StorageFormat::Csv => "activity_log.csv",
            StorageFormat::Json => "output.json",
        }
    }
}

impl Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageFormat::Csv => write!(f, "csv"),
            StorageFormat::Json => write!(f, "json"),
        }
    }
}

/// Creates the store for `format`. Without an explicit `path` the format's default file name
/// in the working directory is used. Nothing is touched on disk until the first save.
pub fn create_store(format: StorageFormat, path: Option<PathBuf>) -> Box<dyn ActivityStore> {
    let path = path.unwrap_or_else(|| Path::new(format.default_file_name()).to_path_buf());
    match format {
        StorageFormat::Csv => Box::new(CsvActivityStore::new(path)),
        StorageFormat::Json => Box::new(JsonActivityStore::new(path)),
    }
}
