use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, error};

use crate::tracking::activity::Activity;

use super::{activity_storage::ActivityStore, entities::ActivityRecord, error::StoreError};

/// Keeps activities as a single indented JSON array. Every save reads the whole document,
/// appends to it and rewrites the file while holding an exclusive lock.
pub struct JsonActivityStore {
    path: PathBuf,
}

impl JsonActivityStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse(&self, data: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        // Opening for a save creates the file, so an empty one is the same as a missing one.
        if data.trim().is_empty() {
            return Ok(vec![]);
        }
        serde_json::from_str(data).map_err(|source| {
            error!("Activity list at {:?} is corrupted: {source}", self.path);
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })
    }

    async fn append_with_file(
        &self,
        file: &mut File,
        record: ActivityRecord,
    ) -> Result<(), StoreError> {
        // The process of appending is as such.
        // 1. Read all previous records. Stop without writing if they can't be parsed.
        // 2. Append the new record.
        // 3. Truncate the file and write the whole list back.
        let mut data = String::new();
        file.read_to_string(&mut data)
            .await
            .map_err(StoreError::io(&self.path))?;

        let mut records = self.parse(&data)?;
        records.push(record);
        let buffer = serde_json::to_string_pretty(&records)?;

        file.set_len(0).await.map_err(StoreError::io(&self.path))?;
        file.rewind().await.map_err(StoreError::io(&self.path))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(StoreError::io(&self.path))?;
        file.flush().await.map_err(StoreError::io(&self.path))?;
        debug!("Rewrote {:?} with {} activities", self.path, records.len());
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for JsonActivityStore {
    async fn append(&self, activity: Activity) -> Result<(), StoreError> {
        let record = ActivityRecord::from(&activity);
        debug!("Appending {record:?} to {:?}", self.path);

        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(StoreError::io(&self.path))?;

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
        let mut data = String::new();
        let read = file.read_to_string(&mut data).await;
        file.unlock_async()
            .await
            .map_err(StoreError::io(&self.path))?;
        read.map_err(StoreError::io(&self.path))?;

        self.parse(&data)
    }
}
