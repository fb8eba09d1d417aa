//! Consumer checkpoints.
//!
//! A checkpoint persists the index snapshot and then writes a small JSON
//! record next to it (`<snapshot key>.checkpoint.json`) describing what
//! the snapshot covers. The record is informational; the snapshot alone
//! defines which positions are durable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docrag_storage::{get_optional, ObjectStore};
use docrag_types::IndexKind;
use docrag_vector::{IndexSnapshot, SnapshotStore, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerCheckpoint {
    /// Vectors in the persisted snapshot
    pub snapshot_count: u64,
    /// Messages acknowledged by this consumer over its lifetime
    pub acknowledged_total: u64,
    pub orphaned_positions: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ConsumerCheckpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>, IngestError> {
        serde_json::to_vec(self).map_err(IngestError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(bytes).map_err(IngestError::from)
    }
}

/// Persists snapshots and checkpoint records to the object store.
#[derive(Clone)]
pub struct Checkpointer {
    snapshots: SnapshotStore,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    record_key: String,
}

impl Checkpointer {
    pub fn new(objects: Arc<dyn ObjectStore>, bucket: &str, snapshot_key: &str) -> Self {
        Self {
            snapshots: SnapshotStore::new(objects.clone(), bucket, snapshot_key),
            objects,
            bucket: bucket.to_string(),
            record_key: format!("{}.checkpoint.json", snapshot_key),
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Load the index from the last snapshot (empty if missing or unusable).
    pub async fn load_index(
        &self,
        kind: IndexKind,
        dimension: usize,
    ) -> Result<Box<dyn VectorIndex>, IngestError> {
        Ok(self.snapshots.load(kind, dimension).await?)
    }

    /// Persist the snapshot, then the record. Only the snapshot write can
    /// fail the checkpoint.
    pub async fn persist(
        &self,
        snapshot: &IndexSnapshot,
        acknowledged_total: u64,
        orphaned_positions: u64,
    ) -> Result<(), IngestError> {
        self.snapshots.persist(snapshot).await?;

        let record = ConsumerCheckpoint {
            snapshot_count: snapshot.count,
            acknowledged_total,
            orphaned_positions,
            updated_at: Utc::now(),
        };
        match record.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = self.objects.put(&self.bucket, &self.record_key, bytes).await {
                    warn!(error = %e, "Failed to write checkpoint record");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode checkpoint record"),
        }

        debug!(snapshot_count = snapshot.count, "Checkpoint complete");
        Ok(())
    }

    pub async fn load_record(&self) -> Result<Option<ConsumerCheckpoint>, IngestError> {
        match get_optional(self.objects.as_ref(), &self.bucket, &self.record_key).await? {
            Some(bytes) => Ok(Some(ConsumerCheckpoint::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}
