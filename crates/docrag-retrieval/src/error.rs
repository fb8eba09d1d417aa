//! Error types for retrieval.

use docrag_embeddings::EmbeddingError;
use docrag_vector::VectorError;
use thiserror::Error;

/// Failures inside a retrieval. Callers of
/// [`RetrievalService::retrieve`](crate::RetrievalService::retrieve) never
/// see these; they are logged and the result degrades to empty.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for RetrievalError {
    fn from(err: tokio::task::JoinError) -> Self {
        RetrievalError::Task(err.to_string())
    }
}
