//! Index snapshots.
//!
//! A snapshot is the whole index as one opaque bincode blob:
//! `{version, dimension, count, vectors}`. It lives in the object store
//! under a fixed key. A missing or unreadable snapshot loads as an empty
//! index with a warning; startup never fails on it.

use std::sync::Arc;

use docrag_storage::{get_optional, ObjectStore};
use docrag_types::IndexKind;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VectorError;
use crate::index::{empty_index, index_from_snapshot, VectorIndex};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub dimension: usize,
    /// Number of valid positions
    pub count: u64,
    /// Row-major, `count * dimension` floats
    pub vectors: Vec<f32>,
}

impl IndexSnapshot {
    pub fn new(dimension: usize, vectors: Vec<f32>) -> Self {
        let count = if dimension == 0 {
            0
        } else {
            (vectors.len() / dimension) as u64
        };
        Self {
            version: SNAPSHOT_VERSION,
            dimension,
            count,
            vectors,
        }
    }

    pub fn validate(&self) -> Result<(), VectorError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(VectorError::Snapshot(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.dimension == 0 {
            return Err(VectorError::Snapshot("zero dimension".to_string()));
        }
        if self.vectors.len() as u64 != self.count * self.dimension as u64 {
            return Err(VectorError::Snapshot(format!(
                "{} floats for {} vectors of dimension {}",
                self.vectors.len(),
                self.count,
                self.dimension
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, VectorError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, VectorError> {
        let snapshot: IndexSnapshot = bincode::deserialize(bytes)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Build an index from optional snapshot bytes, falling back to empty.
///
/// Only building the empty index itself can fail.
pub fn load_or_empty(
    kind: IndexKind,
    dimension: usize,
    bytes: Option<&[u8]>,
) -> Result<Box<dyn VectorIndex>, VectorError> {
    let Some(bytes) = bytes else {
        info!(?kind, dimension, "No snapshot found, starting with empty index");
        return empty_index(kind, dimension);
    };

    let restored = IndexSnapshot::decode(bytes).and_then(|snapshot| {
        if snapshot.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: snapshot.dimension,
            });
        }
        index_from_snapshot(kind, snapshot)
    });

    match restored {
        Ok(index) => {
            info!(?kind, vectors = index.len(), "Loaded index snapshot");
            Ok(index)
        }
        Err(e) => {
            warn!(error = %e, "Index snapshot unusable, starting with empty index");
            empty_index(kind, dimension)
        }
    }
}

/// Reads and writes the snapshot blob at a fixed bucket/key.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the index; storage errors degrade to an empty index.
    pub async fn load(
        &self,
        kind: IndexKind,
        dimension: usize,
    ) -> Result<Box<dyn VectorIndex>, VectorError> {
        let bytes = match get_optional(self.store.as_ref(), &self.bucket, &self.key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, key = %self.key, "Failed to read index snapshot");
                None
            }
        };
        load_or_empty(kind, dimension, bytes.as_deref())
    }

    pub async fn persist(&self, snapshot: &IndexSnapshot) -> Result<(), VectorError> {
        let bytes = snapshot.encode()?;
        let size = bytes.len();
        self.store.put(&self.bucket, &self.key, bytes).await?;
        info!(vectors = snapshot.count, bytes = size, key = %self.key, "Persisted index snapshot");
        Ok(())
    }
}
