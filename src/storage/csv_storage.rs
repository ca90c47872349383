use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::tracking::activity::Activity;

use super::{activity_storage::ActivityStore, entities::ActivityRecord, error::StoreError};

pub const CSV_HEADER: [&str; 3] = ["Activity Name", "Duration", "Date"];

/// Appends activities as rows of a CSV file. The header is written only when the file is
/// empty, so reopening an existing log never duplicates it.
pub struct CsvActivityStore {
    path: PathBuf,
}

impl CsvActivityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn encode(&self, record: &ActivityRecord, with_header: bool) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::Writer::from_writer(vec![]);
        if with_header {
            writer
                .write_record(CSV_HEADER)
                .map_err(StoreError::csv(&self.path))?;
        }
        writer
            .write_record([&record.name, &record.duration, &record.date])
            .map_err(StoreError::csv(&self.path))?;
        writer
            .into_inner()
            .map_err(|e| StoreError::io(&self.path)(e.into_error()))
    }

    async fn append_with_file(
        &self,
        file: &mut File,
        record: ActivityRecord,
    ) -> Result<(), StoreError> {
        let is_new = file.metadata().await.map_err(StoreError::io(&self.path))?.len() == 0;
        let buffer = self.encode(&record, is_new)?;
        file.write_all(&buffer)
            .await
            .map_err(StoreError::io(&self.path))?;
        file.flush().await.map_err(StoreError::io(&self.path))?;
        Ok(())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        let mut records = vec![];
        for row in reader.records() {
            let row = row.map_err(StoreError::csv(&self.path))?;
            match (row.get(0), row.get(1), row.get(2)) {
                (Some(name), Some(duration), Some(date)) => records.push(ActivityRecord {
                    name: name.to_string(),
                    duration: duration.to_string(),
                    date: date.to_string(),
                }),
                _ => warn!("Skipping short row {row:?} in {:?}", self.path),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ActivityStore for CsvActivityStore {
    async fn append(&self, activity: Activity) -> Result<(), StoreError> {
        let record = ActivityRecord::from(&activity);
        debug!("Appending {record:?} to {:?}", self.path);

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .map_err(StoreError::io(&self.path))?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive().map_err(StoreError::io(&self.path))?;
        let result = self.append_with_file(&mut file, record).await;
        file.unlock_async()
            .await
            .map_err(StoreError::io(&self.path))?;
        result
    }

    async fn load_all(&self) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };

        file.lock_shared().map_err(StoreError::io(&self.path))?;
        let mut data = vec![];
        let read = file.read_to_end(&mut data).await;
        file.unlock_async()
            .await
            .map_err(StoreError::io(&self.path))?;
        read.map_err(StoreError::io(&self.path))?;

        self.decode(&data)
    }
}
