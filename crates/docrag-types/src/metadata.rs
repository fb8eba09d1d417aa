//! Metadata entry type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::QueueMessage;

/// Per-vector metadata, looked up by `vector_position` at query time.
///
/// A position is only eligible to appear in results once its entry exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub chunk_id: String,
    pub doc_id: String,
    /// Position assigned by the vector index
    pub vector_position: u64,
    pub text: String,
    pub source_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl MetadataEntry {
    /// Build the entry for a message that was added at `vector_position`.
    pub fn from_message(message: &QueueMessage, vector_position: u64) -> Self {
        Self {
            chunk_id: message.chunk_id.clone(),
            doc_id: message.doc_id.clone(),
            vector_position,
            text: message.text.clone(),
            source_key: message.source_key.clone(),
            timestamp: message.timestamp,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_message_copies_fields() {
        let message = QueueMessage {
            chunk_id: "a.txt#000002".to_string(),
            doc_id: "a.txt".to_string(),
            text: "gears and pulleys".to_string(),
            source_key: "a.txt".to_string(),
            timestamp: Utc::now(),
        };
        let entry = MetadataEntry::from_message(&message, 17);

        assert_eq!(entry.vector_position, 17);
        assert_eq!(entry.chunk_id, message.chunk_id);
        assert_eq!(entry.text, message.text);
    }

    #[test]
    fn test_json_uses_millisecond_timestamp() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let entry = MetadataEntry {
            chunk_id: "c".to_string(),
            doc_id: "d".to_string(),
            vector_position: 0,
            text: "t".to_string(),
            source_key: "d".to_string(),
            timestamp: ts,
        };
        let json: serde_json::Value = serde_json::from_slice(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000_123i64);
        assert_eq!(MetadataEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap(), entry);
    }
}
