//! Queue message type.
//!
//! One message is sent per chunk. Messages are delivered at least once,
//! so every consumer step must tolerate seeing the same `chunk_id` again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;

/// A chunk-ready work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Idempotency key
    pub chunk_id: String,
    /// Document ID
    pub doc_id: String,
    /// Text to embed
    pub text: String,
    /// Object key of the uploaded file
    pub source_key: String,
    /// Chunk creation time (milliseconds since epoch in JSON)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl QueueMessage {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<&Chunk> for QueueMessage {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
            text: chunk.text.clone(),
            source_key: chunk.source_key.clone(),
            timestamp: chunk.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_chunk_keeps_identity() {
        let chunk = Chunk::new("doc-1", "uploads/doc-1.txt", "hello world", 2, Utc::now());
        let message = QueueMessage::from(&chunk);
        assert_eq!(message.chunk_id, chunk.chunk_id);
        assert_eq!(message.doc_id, "doc-1");
        assert_eq!(message.text, "hello world");
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        assert!(QueueMessage::from_bytes(b"{\"chunk\": \"missing fields\"}").is_err());
        assert!(QueueMessage::from_bytes(b"not json").is_err());
    }

    #[test]
    fn test_json_uses_millisecond_timestamp() {
        let chunk = Chunk::new("d", "k", "t", 0, Utc::now());
        let bytes = QueueMessage::from(&chunk).to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value["timestamp"].is_i64());
    }
}
