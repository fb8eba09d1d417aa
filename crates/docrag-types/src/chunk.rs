//! Chunk type.
//!
//! A chunk is created by the chunker, one per split segment, and is
//! immutable afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build the deterministic chunk identity for a segment of a document.
///
/// Re-ingesting the same object yields the same ids, which lets the
/// consumer deduplicate redelivered or re-sent work.
pub fn chunk_id_for(doc_id: &str, sequence_index: usize) -> String {
    format!("{}#{:06}", doc_id, sequence_index)
}

/// A bounded-size segment of extracted document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identity (idempotency key)
    pub chunk_id: String,
    /// Document the chunk belongs to
    pub doc_id: String,
    /// Object key of the uploaded file
    pub source_key: String,
    /// Chunk text
    pub text: String,
    /// Position of the chunk within its document
    pub sequence_index: usize,
    /// Creation time (milliseconds since epoch in JSON)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Chunk {
    pub fn new(
        doc_id: impl Into<String>,
        source_key: impl Into<String>,
        text: impl Into<String>,
        sequence_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let doc_id = doc_id.into();
        Self {
            chunk_id: chunk_id_for(&doc_id, sequence_index),
            doc_id,
            source_key: source_key.into(),
            text: text.into(),
            sequence_index,
            timestamp,
        }
    }

    /// Number of whitespace-separated words in the chunk text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
