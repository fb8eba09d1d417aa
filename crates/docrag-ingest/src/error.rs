//! Error types for ingestion.

use docrag_embeddings::EmbeddingError;
use docrag_extract::ExtractError;
use docrag_storage::StorageError;
use docrag_vector::VectorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Malformed upload; the file is abandoned
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    /// Metadata write failed after the vector was added
    #[error("Metadata write failed at position {position}: {source}")]
    MetadataWrite { position: u64, source: VectorError },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}

/// What the consumer does with a message whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Leave the lease to expire; the queue redelivers
    Retry,
    /// Park the message; redelivery cannot help
    DeadLetter,
}

impl IngestError {
    pub fn action(&self) -> FailureAction {
        match self {
            IngestError::MalformedMessage(_) => FailureAction::DeadLetter,
            _ => FailureAction::Retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::MalformedMessage("missing field `text`".to_string());
        assert_eq!(err.to_string(), "Malformed message: missing field `text`");
    }

    #[test]
    fn test_actions() {
        assert_eq!(
            IngestError::MalformedMessage(String::new()).action(),
            FailureAction::DeadLetter
        );
        assert_eq!(
            IngestError::Embedding(EmbeddingError::EmptyOutput).action(),
            FailureAction::Retry
        );
        let err = IngestError::MetadataWrite {
            position: 3,
            source: VectorError::LockPoisoned("x".to_string()),
        };
        assert_eq!(err.action(), FailureAction::Retry);
    }
}
