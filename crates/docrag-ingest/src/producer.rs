//! Ingestion producer: object -> text -> chunks -> queue messages.

use std::sync::Arc;

use chrono::Utc;
use docrag_extract::{extract, Chunker, Extraction};
use docrag_storage::{ObjectStore, WorkQueue};
use docrag_types::{Chunk, FileType, QueueMessage};
use docrag_vector::MetadataStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub key: String,
    pub file_type: String,
    pub chunks_sent: usize,
    /// Entries of a previous version past the new chunk count
    pub stale_chunks_removed: usize,
    /// No extractor for this file type; nothing was sent
    pub skipped_unsupported: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrefixReport {
    pub ingested: Vec<IngestReport>,
    /// `(key, error)` for objects that could not be ingested
    pub failed: Vec<(String, String)>,
}

impl PrefixReport {
    pub fn chunks_sent(&self) -> usize {
        self.ingested.iter().map(|r| r.chunks_sent).sum()
    }
}

pub struct IngestService {
    objects: Arc<dyn ObjectStore>,
    queue: Arc<dyn WorkQueue>,
    chunker: Chunker,
    metadata: Option<Arc<dyn MetadataStore>>,
}

impl IngestService {
    pub fn new(objects: Arc<dyn ObjectStore>, queue: Arc<dyn WorkQueue>, chunker: Chunker) -> Self {
        Self {
            objects,
            queue,
            chunker,
            metadata: None,
        }
    }

    /// Drop metadata of chunks a re-uploaded document no longer has.
    ///
    /// Chunks that still exist but changed text are superseded by the
    /// consumer when their new message is committed.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Ingest one object. The object key is both `doc_id` and `source_key`.
    ///
    /// Unsupported types are reported, not failed. Corrupt payloads fail
    /// with [`IngestError::Extract`] before anything is sent.
    pub async fn ingest_object(&self, bucket: &str, key: &str) -> Result<IngestReport, IngestError> {
        let bytes = self.objects.get(bucket, key).await?;
        let file_type = FileType::from_key(key);

        let extraction = {
            let file_type = file_type.clone();
            tokio::task::spawn_blocking(move || extract(&bytes, &file_type)).await??
        };

        let text = match extraction {
            Extraction::Text(text) => text,
            Extraction::Unsupported(hint) => {
                warn!(key, hint = %hint, "Skipping unsupported file");
                return Ok(IngestReport {
                    key: key.to_string(),
                    file_type: file_type.to_string(),
                    chunks_sent: 0,
                    stale_chunks_removed: 0,
                    skipped_unsupported: true,
                });
            }
        };

        let chunks = self
            .chunker
            .chunk_document(&text, &file_type, key, key, Utc::now());
        let stale_chunks_removed = self.remove_stale_chunks(key, &chunks)?;
        for chunk in &chunks {
            self.queue
                .send(QueueMessage::from(chunk).to_bytes()?)
                .await?;
        }

        info!(key, file_type = %file_type, chunks = chunks.len(), "Ingested object");
        Ok(IngestReport {
            key: key.to_string(),
            file_type: file_type.to_string(),
            chunks_sent: chunks.len(),
            stale_chunks_removed,
            skipped_unsupported: false,
        })
    }

    fn remove_stale_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<usize, IngestError> {
        let Some(metadata) = &self.metadata else {
            return Ok(0);
        };

        let mut removed = 0;
        for entry in metadata.document_entries(doc_id)? {
            let kept = chunks.iter().any(|c| c.chunk_id == entry.chunk_id);
            if !kept && metadata.delete_chunk(&entry.chunk_id)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(doc_id, removed, "Removed chunks dropped from the new version");
        }
        Ok(removed)
    }

    /// Ingest every object under `prefix`. One bad object does not stop
    /// the rest.
    pub async fn ingest_prefix(&self, bucket: &str, prefix: &str) -> Result<PrefixReport, IngestError> {
        let mut report = PrefixReport::default();

        for key in self.objects.list(bucket, prefix).await? {
            match self.ingest_object(bucket, &key).await {
                Ok(r) => report.ingested.push(r),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to ingest object");
                    report.failed.push((key, e.to_string()));
                }
            }
        }

        info!(
            prefix,
            objects = report.ingested.len(),
            failed = report.failed.len(),
            chunks = report.chunks_sent(),
            "Ingested prefix"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use docrag_extract::ChunkerConfig;
    use docrag_storage::{InMemoryObjectStore, InMemoryQueue};
    use docrag_types::MetadataEntry;
    use docrag_vector::InMemoryMetadataStore;

    fn service() -> (IngestService, Arc<InMemoryObjectStore>, Arc<InMemoryQueue>) {
        let objects = Arc::new(InMemoryObjectStore::new());
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        let service = IngestService::new(
            objects.clone(),
            queue.clone(),
            Chunker::new(ChunkerConfig::default()),
        );
        (service, objects, queue)
    }

    async fn drain(queue: &InMemoryQueue) -> Vec<QueueMessage> {
        queue
            .receive(1000, Duration::ZERO)
            .await
            .unwrap()
            .iter()
            .map(|d| QueueMessage::from_bytes(&d.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_text_object_sends_one_message_per_chunk() {
        let (service, objects, queue) = service();
        let text: String = (0..3)
            .map(|i| vec![format!("p{}", i); 201].join(" "))
            .collect::<Vec<_>>()
            .join("\n\n");
        objects
            .put("documents", "notes.txt", text.into_bytes())
            .await
            .unwrap();

        let report = service.ingest_object("documents", "notes.txt").await.unwrap();
        assert_eq!(report.chunks_sent, 3);
        assert!(!report.skipped_unsupported);

        let messages = drain(&queue).await;
        let ids: Vec<&str> = messages.iter().map(|m| m.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["notes.txt#000000", "notes.txt#000001", "notes.txt#000002"]);
        assert!(messages.iter().all(|m| m.doc_id == "notes.txt"));
    }

    #[tokio::test]
    async fn test_csv_rows_grouped() {
        let (service, objects, queue) = service();
        let csv: String = (0..25).map(|i| format!("{},{}\n", i, i * i)).collect();
        objects.put("documents", "t.csv", csv.into_bytes()).await.unwrap();

        let report = service.ingest_object("documents", "t.csv").await.unwrap();
        assert_eq!(report.chunks_sent, 3);
        let sizes: Vec<usize> = drain(&queue).await.iter().map(|m| m.text.lines().count()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_unsupported_is_skipped() {
        let (service, objects, queue) = service();
        objects.put("documents", "photo.png", vec![0x89, b'P']).await.unwrap();

        let report = service.ingest_object("documents", "photo.png").await.unwrap();
        assert!(report.skipped_unsupported);
        assert_eq!(queue.stats().await.unwrap().ready, 0);
    }

    #[tokio::test]
    async fn test_corrupt_and_missing_objects_fail() {
        let (service, objects, _queue) = service();
        objects.put("documents", "bad.txt", vec![0xff, 0xfe]).await.unwrap();

        assert!(matches!(
            service.ingest_object("documents", "bad.txt").await,
            Err(IngestError::Extract(_))
        ));
        assert!(matches!(
            service.ingest_object("documents", "gone.txt").await,
            Err(IngestError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_prefix_continues_past_failures() {
        let (service, objects, _queue) = service();
        objects.put("documents", "in/a.txt", b"alpha".to_vec()).await.unwrap();
        objects.put("documents", "in/b.txt", vec![0xff]).await.unwrap();
        objects.put("documents", "in/c.txt", b"gamma".to_vec()).await.unwrap();
        objects.put("documents", "other/d.txt", b"delta".to_vec()).await.unwrap();

        let report = service.ingest_prefix("documents", "in/").await.unwrap();
        assert_eq!(report.ingested.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "in/b.txt");
        assert_eq!(report.chunks_sent(), 2);
    }

    #[tokio::test]
    async fn test_reingest_reuses_chunk_ids() {
        let (service, objects, queue) = service();
        objects.put("documents", "r.txt", b"one\n\ntwo".to_vec()).await.unwrap();

        service.ingest_object("documents", "r.txt").await.unwrap();
        service.ingest_object("documents", "r.txt").await.unwrap();

        let ids: Vec<String> = drain(&queue).await.into_iter().map(|m| m.chunk_id).collect();
        assert_eq!(ids, vec!["r.txt#000000", "r.txt#000000"]);
    }

    #[tokio::test]
    async fn test_shorter_reupload_drops_trailing_chunks() {
        let (service, objects, _queue) = service();
        let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let service = service.with_metadata(metadata.clone());
        for (position, seq) in (0..3).enumerate() {
            let chunk = Chunk::new("r.txt", "r.txt", format!("old part {}", seq), seq, Utc::now());
            let message = QueueMessage::from(&chunk);
            metadata
                .put(&MetadataEntry::from_message(&message, position as u64))
                .unwrap();
        }

        objects.put("documents", "r.txt", b"only one paragraph now".to_vec()).await.unwrap();
        let report = service.ingest_object("documents", "r.txt").await.unwrap();

        assert_eq!(report.chunks_sent, 1);
        assert_eq!(report.stale_chunks_removed, 2);
        let remaining: Vec<String> = metadata
            .document_entries("r.txt")
            .unwrap()
            .into_iter()
            .map(|e| e.chunk_id)
            .collect();
        assert_eq!(remaining, vec!["r.txt#000000"]);
    }
}
