//! Vector index and metadata error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot could not be decoded or does not match the index
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Object store failure while loading or persisting a snapshot
    #[error("Snapshot storage error: {0}")]
    Storage(#[from] docrag_storage::StorageError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for VectorError {
    fn from(err: bincode::Error) -> Self {
        VectorError::Snapshot(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for VectorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        VectorError::LockPoisoned(err.to_string())
    }
}
