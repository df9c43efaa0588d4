//! Durable per-pipeline progress: consumed offsets, watermark and aggregation state.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::aggregate::StateEntry;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint io failed for {path:?}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("checkpoint {path:?} is corrupt: {error}")]
    Corrupt {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(serde_json::Error),
}

/// Everything needed to resume a pipeline after the batch `batch_id - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint<K> {
    /// Id of the next micro-batch to run
    pub batch_id: u64,
    /// Next offset to read, per source partition
    pub offsets: BTreeMap<i32, i64>,
    pub max_event_time: Option<DateTime<Utc>>,
    pub state: Vec<StateEntry<K>>,
}

impl<K> Default for Checkpoint<K> {
    fn default() -> Self {
        Self {
            batch_id: 0,
            offsets: BTreeMap::new(),
            max_event_time: None,
            state: Vec::new(),
        }
    }
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: &Path, pipeline: &str) -> Self {
        Self {
            path: dir.join(format!("{pipeline}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the pipeline has never checkpointed.
    pub async fn load<K>(&self) -> Result<Option<Checkpoint<K>>, CheckpointError>
    where
        K: serde::de::DeserializeOwned,
    {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no checkpoint found");
                return Ok(None);
            }
            Err(error) => return Err(self.io_error(error)),
        };

        let checkpoint: Checkpoint<K> =
            serde_json::from_slice(&bytes).map_err(|error| CheckpointError::Corrupt {
                path: self.path.clone(),
                error,
            })?;
        info!(
            path = ?self.path,
            batch_id = checkpoint.batch_id,
            "loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    /// Like [`CheckpointStore::load`], but a corrupt checkpoint is moved aside
    /// to `{pipeline}.json.corrupt` and the pipeline starts from scratch.
    pub async fn load_or_reset<K>(&self) -> Result<Checkpoint<K>, CheckpointError>
    where
        K: serde::de::DeserializeOwned,
    {
        match self.load().await {
            Ok(checkpoint) => Ok(checkpoint.unwrap_or_default()),
            Err(CheckpointError::Corrupt { path, error }) => {
                let quarantine = path.with_extension("json.corrupt");
                error!(
                    path = ?path,
                    moved_to = ?quarantine,
                    "discarding corrupt checkpoint, reprocessing from the beginning: {}",
                    error
                );
                tokio::fs::rename(&path, &quarantine)
                    .await
                    .map_err(|error| self.io_error(error))?;
                Ok(Checkpoint::default())
            }
            Err(error) => Err(error),
        }
    }

    /// Replace the checkpoint. The new content is written next to the old one
    /// and renamed over it, so a crash leaves either version intact.
    pub async fn save<K: Serialize>(
        &self,
        checkpoint: &Checkpoint<K>,
    ) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec(checkpoint).map_err(CheckpointError::Serialize)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| self.io_error(error))?;
        }

        let staging = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|error| self.io_error(error))?;
        file.write_all(&json)
            .await
            .map_err(|error| self.io_error(error))?;
        // fsync before the rename
        file.sync_all()
            .await
            .map_err(|error| self.io_error(error))?;
        drop(file);
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|error| self.io_error(error))?;

        debug!(path = ?self.path, batch_id = checkpoint.batch_id, "saved checkpoint");
        Ok(())
    }

    fn io_error(&self, error: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn checkpoint() -> Checkpoint<String> {
        Checkpoint {
            batch_id: 7,
            offsets: BTreeMap::from([(0, 42), (1, 3)]),
            max_event_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            state: vec![StateEntry {
                window: None,
                key: "Kent".to_owned(),
                total: 12,
            }],
        }
    }

    #[tokio::test]
    async fn missing_checkpoint_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "turnout_by_location_kafka");

        let loaded: Option<Checkpoint<String>> = store.load().await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_then_load_restores_progress() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(&dir.path().join("nested"), "turnout");

        store.save(&checkpoint()).await.unwrap();
        let loaded: Checkpoint<String> = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, checkpoint());

        let mut next = checkpoint();
        next.batch_id = 8;
        next.offsets.insert(0, 50);
        store.save(&next).await.unwrap();
        let loaded: Checkpoint<String> = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.batch_id, 8);
        assert_eq!(loaded.offsets.get(&0), Some(&50));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "turnout");
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        let loaded = store.load::<String>().await;
        assert!(matches!(loaded, Err(CheckpointError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_moved_aside_on_reset() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path(), "turnout");
        tokio::fs::write(store.path(), b"{\"batch_id\": 3, \"offs").await.unwrap();

        let loaded: Checkpoint<String> = store.load_or_reset().await.unwrap();
        assert_eq!(loaded, Checkpoint::default());
        assert!(!store.path().exists());
        assert!(store.path().with_extension("json.corrupt").exists());

        store.save(&checkpoint()).await.unwrap();
        let loaded: Checkpoint<String> = store.load_or_reset().await.unwrap();
        assert_eq!(loaded, checkpoint());
    }
}
