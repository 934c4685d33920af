//! JSON-file implementation of the `DownloadStoragePort` trait.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use kino_core::download::{DownloadRecord, PartitionState};
use kino_core::ports::{DownloadStoragePort, StorageError};

/// Partition file names, in save order.
const PARTITIONS: [&str; 4] = ["queued", "active", "completed", "failed"];

/// JSON-file implementation of the `DownloadStoragePort` trait.
///
/// Each partition lives in its own file (`queued.json`, `active.json`,
/// `completed.json`, `failed.json`) under the state directory, so damage
/// to one partition never takes the others down with it. Writes go to a
/// `.tmp` sibling first and are renamed into place, which keeps every
/// partition file either the old or the new version after a crash.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    /// Create a store rooted at the given state directory.
    ///
    /// The directory is created lazily on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of a partition file.
    fn partition_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Serialize one partition and rename it into place.
    async fn write_partition(
        &self,
        name: &str,
        records: &[DownloadRecord],
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        let target = self.partition_path(name);
        let tmp = self.dir.join(format!("{name}.json.tmp"));

        fs::write(&tmp, &json)
            .await
            .map_err(|e| StorageError::from_io(&e))?;
        fs::rename(&tmp, &target)
            .await
            .map_err(|e| StorageError::from_io(&e))?;

        Ok(())
    }

    /// Read one partition, degrading to empty on missing or corrupt files.
    async fn read_partition(&self, name: &str) -> Vec<DownloadRecord> {
        let path = self.partition_path(name);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    partition = name,
                    path = %path.display(),
                    error = %e,
                    "Could not read partition file; treating as empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    partition = name,
                    path = %path.display(),
                    error = %e,
                    "Corrupt partition file; treating as empty"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DownloadStoragePort for JsonStateStore {
    async fn save(&self, state: &PartitionState) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::from_io(&e))?;

        let partitions: [(&str, &[DownloadRecord]); 4] = [
            (PARTITIONS[0], &state.queued),
            (PARTITIONS[1], &state.active),
            (PARTITIONS[2], &state.completed),
            (PARTITIONS[3], &state.failed),
        ];

        // Best-effort: keep writing the remaining partitions after a
        // failure, return the first error for observability
        let mut first_error = None;
        for (name, records) in partitions {
            if let Err(e) = self.write_partition(name, records).await {
                tracing::warn!(partition = name, error = %e, "Failed to write partition");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn load(&self) -> Result<PartitionState, StorageError> {
        Ok(PartitionState {
            queued: self.read_partition(PARTITIONS[0]).await,
            active: self.read_partition(PARTITIONS[1]).await,
            completed: self.read_partition(PARTITIONS[2]).await,
            failed: self.read_partition(PARTITIONS[3]).await,
        })
    }
}
