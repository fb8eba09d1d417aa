//! Ingestion queue consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docrag_embeddings::EmbeddingModel;
use docrag_storage::{Delivery, Lease, StorageError, WorkQueue};
use docrag_types::{ConsumerSettings, MetadataEntry, QueueMessage};
use docrag_vector::{MetadataStore, SharedIndex, VectorError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::checkpoint::Checkpointer;
use crate::error::{FailureAction, IngestError};

/// Pause after a failed receive before polling again.
const RECEIVE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Checkpoint after this many settled messages
    pub save_interval: usize,
    pub receive_batch: usize,
    pub wait: Duration,
    /// Deliveries beyond this are dead-lettered
    pub max_receives: u32,
    /// Checkpoint when a receive comes back empty and leases are pending
    pub flush_idle: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from(&ConsumerSettings::default())
    }
}

impl From<&ConsumerSettings> for ConsumerConfig {
    fn from(settings: &ConsumerSettings) -> Self {
        Self {
            save_interval: settings.save_interval.max(1),
            receive_batch: settings.receive_batch.max(1),
            wait: Duration::from_secs(settings.wait_secs),
            max_receives: settings.max_receives,
            flush_idle: settings.flush_idle,
        }
    }
}

/// Per-message processing states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Received,
    Embedding,
    Indexed,
    Committed,
    Acknowledged,
}

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Vector and metadata written; lease awaits the next checkpoint
    Committed { position: u64 },
    /// Chunk id already indexed; lease awaits the next checkpoint
    Duplicate { position: u64 },
    DeadLettered,
    /// Left for redelivery
    Retry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub committed: u64,
    pub duplicates: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub acknowledged: u64,
    pub checkpoints: u64,
    pub checkpoint_failures: u64,
    /// Vectors added whose metadata write failed; never resolvable
    pub orphaned_positions: u64,
    /// Metadata entries removed at startup for positions past the snapshot
    pub purged_on_startup: u64,
}

/// Single-writer consumer for one index.
pub struct IngestConsumer {
    queue: Arc<dyn WorkQueue>,
    embedder: Arc<dyn EmbeddingModel>,
    index: SharedIndex,
    metadata: Arc<dyn MetadataStore>,
    checkpointer: Checkpointer,
    config: ConsumerConfig,
    pending: Vec<Lease>,
    since_checkpoint: usize,
    /// Vector count of the last persisted snapshot
    durable_count: u64,
    last_errors: HashMap<u64, String>,
    stats: ConsumerStats,
}

impl IngestConsumer {
    /// Build a consumer over an index freshly loaded from its snapshot.
    ///
    /// Reconciles metadata first: entries at positions the snapshot does
    /// not cover are purged.
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        embedder: Arc<dyn EmbeddingModel>,
        index: SharedIndex,
        metadata: Arc<dyn MetadataStore>,
        checkpointer: Checkpointer,
        config: ConsumerConfig,
    ) -> Result<Self, IngestError> {
        let (count, dimension) = {
            let index = index.read().map_err(VectorError::from)?;
            (index.len() as u64, index.dimension())
        };

        let model_dimension = embedder.info().dimension;
        if model_dimension != dimension {
            return Err(IngestError::Config(format!(
                "embedding dimension {} does not match index dimension {}",
                model_dimension, dimension
            )));
        }

        let purged = metadata.purge_from_position(count)?;
        if purged > 0 && count == 0 {
            error!(
                purged,
                "No usable index snapshot; purged all metadata, documents must be re-ingested"
            );
        } else if purged > 0 {
            warn!(
                purged,
                snapshot_count = count,
                "Purged metadata for positions lost since the last snapshot"
            );
        }

        info!(snapshot_count = count, dimension, "Consumer ready");
        Ok(Self {
            queue,
            embedder,
            index,
            metadata,
            checkpointer,
            config,
            pending: Vec::new(),
            since_checkpoint: 0,
            durable_count: count,
            last_errors: HashMap::new(),
            stats: ConsumerStats {
                purged_on_startup: purged as u64,
                ..Default::default()
            },
        })
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    /// Leases committed but not yet acknowledged.
    pub fn pending_leases(&self) -> usize {
        self.pending.len()
    }

    /// Run until `cancel` fires. Cancellation interrupts only the long-poll
    /// wait; a batch in progress completes and a final checkpoint runs.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ConsumerStats, IngestError> {
        info!(
            save_interval = self.config.save_interval,
            batch = self.config.receive_batch,
            "Consumer started"
        );
        let queue = self.queue.clone();

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                r = queue.receive(self.config.receive_batch, self.config.wait) => r,
            };

            match received {
                Ok(deliveries) => {
                    self.handle_batch(deliveries).await;
                }
                Err(e) => {
                    error!(error = %e, "Queue receive failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Consumer stopping");
        self.checkpoint().await;
        info!(stats = ?self.stats, "Consumer stopped");
        Ok(self.stats.clone())
    }

    /// One receive plus processing. Returns the number of deliveries.
    pub async fn poll_once(&mut self) -> Result<usize, IngestError> {
        let deliveries = self
            .queue
            .receive(self.config.receive_batch, self.config.wait)
            .await?;
        Ok(self.handle_batch(deliveries).await)
    }

    async fn handle_batch(&mut self, deliveries: Vec<Delivery>) -> usize {
        let count = deliveries.len();

        if count == 0 {
            if self.config.flush_idle && !self.pending.is_empty() {
                debug!(pending = self.pending.len(), "Queue idle, flushing");
                self.checkpoint().await;
            }
            return 0;
        }

        for delivery in deliveries {
            self.process_delivery(delivery).await;
            if self.since_checkpoint >= self.config.save_interval {
                self.checkpoint().await;
            }
        }
        count
    }

    /// Drive one delivery through the state machine.
    pub async fn process_delivery(&mut self, delivery: Delivery) -> Outcome {
        let Delivery {
            body,
            lease,
            receive_count,
        } = delivery;
        self.stats.received += 1;
        trace!(sequence = lease.sequence, receive_count, state = ?MessageState::Received, "Message");

        if receive_count > self.config.max_receives {
            let reason = self
                .last_errors
                .remove(&lease.sequence)
                .unwrap_or_else(|| "lease expired without acknowledgement".to_string());
            let reason = format!("exceeded {} receives: {}", self.config.max_receives, reason);
            return self.dead_letter(&lease, &reason).await;
        }

        let message = match QueueMessage::from_bytes(&body) {
            Ok(message) => message,
            Err(e) => {
                let err = IngestError::MalformedMessage(e.to_string());
                return self.fail(&lease, err).await;
            }
        };

        match self.metadata.get_by_chunk_id(&message.chunk_id) {
            Ok(Some(existing))
                if existing.vector_position < self.index_len() && existing.text == message.text =>
            {
                debug!(
                    chunk_id = %message.chunk_id,
                    position = existing.vector_position,
                    "Duplicate delivery skipped"
                );
                self.settle(lease);
                self.stats.duplicates += 1;
                return Outcome::Duplicate {
                    position: existing.vector_position,
                };
            }
            Ok(Some(existing)) if existing.vector_position < self.index_len() => {
                debug!(
                    chunk_id = %message.chunk_id,
                    position = existing.vector_position,
                    "Chunk text changed, superseding"
                );
            }
            Ok(_) => {}
            Err(e) => return self.fail(&lease, e.into()).await,
        }

        match self.commit(&message).await {
            Ok(position) => {
                self.settle(lease);
                self.stats.committed += 1;
                Outcome::Committed { position }
            }
            Err(e) => self.fail(&lease, e).await,
        }
    }

    /// Embedding -> Indexed -> Committed.
    async fn commit(&mut self, message: &QueueMessage) -> Result<u64, IngestError> {
        trace!(chunk_id = %message.chunk_id, state = ?MessageState::Embedding, "Message");
        let embedder = self.embedder.clone();
        let text = message.text.clone();
        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&text)).await??;

        let position = {
            let mut index = self.index.write().map_err(VectorError::from)?;
            index.add(&embedding)?
        };
        trace!(chunk_id = %message.chunk_id, position, state = ?MessageState::Indexed, "Message");

        let entry = MetadataEntry::from_message(message, position);
        if let Err(source) = self.metadata.put(&entry) {
            self.stats.orphaned_positions += 1;
            return Err(IngestError::MetadataWrite { position, source });
        }

        trace!(chunk_id = %message.chunk_id, position, state = ?MessageState::Committed, "Message");
        Ok(position)
    }

    fn settle(&mut self, lease: Lease) {
        self.last_errors.remove(&lease.sequence);
        self.pending.push(lease);
        self.since_checkpoint += 1;
    }

    async fn fail(&mut self, lease: &Lease, err: IngestError) -> Outcome {
        match err.action() {
            FailureAction::DeadLetter => self.dead_letter(lease, &err.to_string()).await,
            FailureAction::Retry => {
                warn!(sequence = lease.sequence, error = %err, "Message failed, awaiting redelivery");
                self.last_errors.insert(lease.sequence, err.to_string());
                self.stats.retries += 1;
                Outcome::Retry
            }
        }
    }

    async fn dead_letter(&mut self, lease: &Lease, reason: &str) -> Outcome {
        match self.queue.dead_letter(lease, reason).await {
            Ok(()) => {
                self.last_errors.remove(&lease.sequence);
                self.stats.dead_lettered += 1;
                Outcome::DeadLettered
            }
            Err(e) => {
                error!(sequence = lease.sequence, error = %e, "Failed to dead-letter message");
                self.stats.retries += 1;
                Outcome::Retry
            }
        }
    }

    fn index_len(&self) -> u64 {
        self.index.read().map(|i| i.len() as u64).unwrap_or(0)
    }

    /// Persist the snapshot, then acknowledge pending leases. A failed
    /// persist keeps the leases pending.
    pub async fn checkpoint(&mut self) {
        if self.pending.is_empty() && self.since_checkpoint == 0 {
            return;
        }
        match self.persist_snapshot().await {
            Ok(()) => self.acknowledge_pending().await,
            Err(e) => {
                self.stats.checkpoint_failures += 1;
                error!(error = %e, pending = self.pending.len(), "Checkpoint failed, will retry");
            }
        }
    }

    /// Write the snapshot if the index grew since the last one.
    pub async fn persist_snapshot(&mut self) -> Result<(), IngestError> {
        let snapshot = self
            .index
            .read()
            .map_err(VectorError::from)?
            .to_snapshot();

        if snapshot.count != self.durable_count {
            self.checkpointer
                .persist(
                    &snapshot,
                    self.stats.acknowledged + self.pending.len() as u64,
                    self.stats.orphaned_positions,
                )
                .await?;
            self.durable_count = snapshot.count;
            self.stats.checkpoints += 1;
            info!(
                snapshot_count = snapshot.count,
                pending = self.pending.len(),
                "Checkpoint persisted"
            );
        }
        self.since_checkpoint = 0;
        Ok(())
    }

    /// Acknowledge every pending lease. Leases lost to redelivery are
    /// dropped; the redelivered copy is deduplicated.
    pub async fn acknowledge_pending(&mut self) {
        for lease in std::mem::take(&mut self.pending) {
            match self.queue.acknowledge(&lease).await {
                Ok(()) => {
                    self.stats.acknowledged += 1;
                    trace!(sequence = lease.sequence, state = ?MessageState::Acknowledged, "Message");
                }
                Err(StorageError::LeaseLost(sequence)) => {
                    debug!(sequence, "Lease superseded before acknowledgement");
                }
                Err(e) => {
                    warn!(sequence = lease.sequence, error = %e, "Acknowledge failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use docrag_embeddings::{Embedding, EmbeddingError, HashEmbedder, ModelInfo};
    use docrag_storage::{InMemoryObjectStore, InMemoryQueue, ObjectStore, QueueStats};
    use docrag_types::IndexKind;
    use docrag_vector::{empty_index, share, DocumentSummary, InMemoryMetadataStore};

    const DIM: usize = 32;

    struct Fixture {
        queue: Arc<InMemoryQueue>,
        objects: Arc<InMemoryObjectStore>,
        index: SharedIndex,
        metadata: Arc<dyn MetadataStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_metadata(Arc::new(InMemoryMetadataStore::new()))
        }

        fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
            Self {
                queue: Arc::new(InMemoryQueue::new(Duration::from_secs(60))),
                objects: Arc::new(InMemoryObjectStore::new()),
                index: share(empty_index(IndexKind::Flat, DIM).unwrap()),
                metadata,
            }
        }

        fn checkpointer(&self) -> Checkpointer {
            Checkpointer::new(self.objects.clone(), "documents", "index/vectors.snapshot")
        }

        fn consumer(&self, embedder: Arc<dyn EmbeddingModel>, save_interval: usize) -> IngestConsumer {
            IngestConsumer::new(
                self.queue.clone(),
                embedder,
                self.index.clone(),
                self.metadata.clone(),
                self.checkpointer(),
                ConsumerConfig {
                    save_interval,
                    receive_batch: 10,
                    wait: Duration::ZERO,
                    max_receives: 3,
                    flush_idle: true,
                },
            )
            .unwrap()
        }

        async fn send(&self, chunk_id: &str, text: &str) {
            let message = QueueMessage {
                chunk_id: chunk_id.to_string(),
                doc_id: "doc.txt".to_string(),
                text: text.to_string(),
                source_key: "doc.txt".to_string(),
                timestamp: Utc::now(),
            };
            self.queue.send(message.to_bytes().unwrap()).await.unwrap();
        }
    }

    fn hash() -> Arc<dyn EmbeddingModel> {
        Arc::new(HashEmbedder::new(DIM).unwrap())
    }

    /// Fails the first `failures` calls.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        failures: AtomicUsize,
    }

    impl EmbeddingModel for FlakyEmbedder {
        fn info(&self) -> &ModelInfo {
            self.inner.info()
        }

        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(EmbeddingError::InvalidInput("backend unavailable".to_string()));
            }
            self.inner.embed(text)
        }
    }

    /// Metadata store whose first `failures` puts fail.
    struct FlakyMetadata {
        inner: InMemoryMetadataStore,
        failures: AtomicUsize,
    }

    impl MetadataStore for FlakyMetadata {
        fn put(&self, entry: &MetadataEntry) -> Result<(), VectorError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(VectorError::Serialization("disk full".to_string()));
            }
            self.inner.put(entry)
        }
        fn get_by_position(&self, p: u64) -> Result<Option<MetadataEntry>, VectorError> {
            self.inner.get_by_position(p)
        }
        fn get_by_chunk_id(&self, c: &str) -> Result<Option<MetadataEntry>, VectorError> {
            self.inner.get_by_chunk_id(c)
        }
        fn document_entries(&self, d: &str) -> Result<Vec<MetadataEntry>, VectorError> {
            self.inner.document_entries(d)
        }
        fn delete_chunk(&self, c: &str) -> Result<bool, VectorError> {
            self.inner.delete_chunk(c)
        }
        fn delete_document(&self, d: &str) -> Result<usize, VectorError> {
            self.inner.delete_document(d)
        }
        fn purge_from_position(&self, p: u64) -> Result<usize, VectorError> {
            self.inner.purge_from_position(p)
        }
        fn count(&self) -> Result<usize, VectorError> {
            self.inner.count()
        }
        fn documents(&self) -> Result<Vec<DocumentSummary>, VectorError> {
            self.inner.documents()
        }
    }

    #[tokio::test]
    async fn test_commit_then_checkpoint_acknowledges() {
        let fx = Fixture::new();
        let mut consumer = fx.consumer(hash(), 2);
        fx.send("doc.txt#000000", "tides and moons").await;
        fx.send("doc.txt#000001", "volcanic islands").await;
        fx.send("doc.txt#000002", "coral reefs").await;

        assert_eq!(consumer.poll_once().await.unwrap(), 3);

        // Two settled triggers a checkpoint; the third stays pending
        assert_eq!(consumer.stats().checkpoints, 1);
        assert_eq!(consumer.stats().acknowledged, 2);
        assert_eq!(consumer.pending_leases(), 1);

        // Idle receive flushes the rest
        assert_eq!(consumer.poll_once().await.unwrap(), 0);
        assert_eq!(consumer.pending_leases(), 0);
        assert_eq!(consumer.stats().acknowledged, 3);

        let entry = fx.metadata.get_by_position(1).unwrap().unwrap();
        assert_eq!(entry.chunk_id, "doc.txt#000001");
        assert_eq!(fx.queue.stats().await.unwrap(), QueueStats::default());
    }

    #[tokio::test]
    async fn test_duplicate_chunk_not_reindexed() {
        let fx = Fixture::new();
        let mut consumer = fx.consumer(hash(), 10);
        fx.send("doc.txt#000000", "glaciers").await;
        fx.send("doc.txt#000000", "glaciers").await;

        consumer.poll_once().await.unwrap();

        assert_eq!(consumer.stats().committed, 1);
        assert_eq!(consumer.stats().duplicates, 1);
        assert_eq!(fx.index.read().unwrap().len(), 1);
        assert_eq!(fx.metadata.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_changed_text_supersedes_old_position() {
        let fx = Fixture::new();
        let mut consumer = fx.consumer(hash(), 10);
        fx.send("doc.txt#000000", "old quarterly numbers").await;
        consumer.poll_once().await.unwrap();

        fx.send("doc.txt#000000", "revised annual forecast").await;
        let outcome = {
            let delivery = fx.queue.receive(1, Duration::ZERO).await.unwrap().remove(0);
            consumer.process_delivery(delivery).await
        };

        assert_eq!(outcome, Outcome::Committed { position: 1 });
        assert_eq!(consumer.stats().duplicates, 0);
        assert_eq!(fx.metadata.get_by_position(0).unwrap(), None);
        let entry = fx.metadata.get_by_chunk_id("doc.txt#000000").unwrap().unwrap();
        assert_eq!(entry.vector_position, 1);
        assert_eq!(entry.text, "revised annual forecast");
        assert_eq!(fx.metadata.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_retries_then_succeeds() {
        let fx = Fixture::new();
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(DIM).unwrap(),
            failures: AtomicUsize::new(1),
        });
        let mut consumer = fx.consumer(embedder, 10);
        fx.send("doc.txt#000000", "deserts").await;

        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().retries, 1);
        assert!(fx.index.read().unwrap().is_empty());

        fx.queue.expire_all_leases().unwrap();
        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().committed, 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_leaves_orphan_and_retries() {
        let metadata = Arc::new(FlakyMetadata {
            inner: InMemoryMetadataStore::new(),
            failures: AtomicUsize::new(1),
        });
        let fx = Fixture::with_metadata(metadata);
        let mut consumer = fx.consumer(hash(), 10);
        fx.send("doc.txt#000000", "rivers").await;

        assert_eq!(consumer.poll_once().await.unwrap(), 1);
        assert_eq!(consumer.stats().orphaned_positions, 1);
        assert!(fx.metadata.get_by_position(0).unwrap().is_none());

        fx.queue.expire_all_leases().unwrap();
        consumer.poll_once().await.unwrap();

        let entry = fx.metadata.get_by_chunk_id("doc.txt#000000").unwrap().unwrap();
        assert_eq!(entry.vector_position, 1);
        assert_eq!(fx.metadata.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_poison_messages_dead_lettered() {
        let fx = Fixture::new();
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(DIM).unwrap(),
            failures: AtomicUsize::new(usize::MAX),
        });
        let mut consumer = fx.consumer(embedder, 10);
        fx.queue.send(b"{not json".to_vec()).await.unwrap();
        fx.send("doc.txt#000000", "never embeds").await;

        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().dead_lettered, 1);

        for _ in 0..3 {
            fx.queue.expire_all_leases().unwrap();
            consumer.poll_once().await.unwrap();
        }

        let stats = fx.queue.stats().await.unwrap();
        assert_eq!(stats.dead_lettered, 2);
        let dead = fx.queue.dead_letters(10).await.unwrap();
        assert!(dead[0].reason.starts_with("Malformed message"));
        assert!(dead[1].reason.contains("backend unavailable"));
        assert_eq!(dead[1].receive_count, 4);
    }

    #[tokio::test]
    async fn test_failed_checkpoint_keeps_leases_pending() {
        let fx = Fixture::new();
        let mut consumer = fx.consumer(hash(), 1);
        // Keys with `..` segments are rejected by every store
        consumer.checkpointer = Checkpointer::new(fx.objects.clone(), "documents", "../bad");

        fx.send("doc.txt#000000", "savannas").await;
        consumer.poll_once().await.unwrap();

        assert_eq!(consumer.stats().checkpoint_failures, 1);
        assert_eq!(consumer.pending_leases(), 1);
        assert_eq!(fx.queue.stats().await.unwrap().in_flight, 1);
    }

    #[tokio::test]
    async fn test_startup_purges_metadata_past_snapshot() {
        let fx = Fixture::new();
        {
            let mut consumer = fx.consumer(hash(), 100);
            fx.send("doc.txt#000000", "first").await;
            consumer.poll_once().await.unwrap();
            consumer.persist_snapshot().await.unwrap();
            consumer.acknowledge_pending().await;

            fx.send("doc.txt#000001", "second").await;
            consumer.poll_once().await.unwrap();
            // Crash: metadata written, snapshot and ack never happen
        }
        assert_eq!(fx.metadata.count().unwrap(), 2);

        let restored = fx
            .checkpointer()
            .load_index(IndexKind::Flat, DIM)
            .await
            .unwrap();
        let fx2 = Fixture {
            index: share(restored),
            queue: fx.queue.clone(),
            objects: fx.objects.clone(),
            metadata: fx.metadata.clone(),
        };
        fx2.queue.expire_all_leases().unwrap();

        let mut consumer = fx2.consumer(hash(), 100);
        assert_eq!(consumer.stats().purged_on_startup, 1);

        consumer.poll_once().await.unwrap();
        assert_eq!(consumer.stats().committed, 1);
        let entry = fx2.metadata.get_by_chunk_id("doc.txt#000001").unwrap().unwrap();
        assert_eq!(entry.vector_position, 1);
        assert_eq!(fx2.index.read().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_snapshot_purges_all_metadata() {
        let fx = Fixture::new();
        {
            let mut consumer = fx.consumer(hash(), 1);
            fx.send("doc.txt#000000", "estuaries").await;
            fx.send("doc.txt#000001", "mangroves").await;
            consumer.poll_once().await.unwrap();
        }
        assert_eq!(fx.metadata.count().unwrap(), 2);
        fx.objects
            .put("documents", "index/vectors.snapshot", vec![0u8; 3])
            .await
            .unwrap();

        let restored = fx
            .checkpointer()
            .load_index(IndexKind::Flat, DIM)
            .await
            .unwrap();
        assert!(restored.is_empty());
        let fx2 = Fixture {
            index: share(restored),
            queue: fx.queue.clone(),
            objects: fx.objects.clone(),
            metadata: fx.metadata.clone(),
        };

        let consumer = fx2.consumer(hash(), 1);
        assert_eq!(consumer.stats().purged_on_startup, 2);
        assert_eq!(fx2.metadata.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_with_final_checkpoint() {
        let fx = Fixture::new();
        let mut consumer = fx.consumer(hash(), 100);
        consumer.config.wait = Duration::from_millis(20);
        fx.send("doc.txt#000000", "prairies").await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let handle = tokio::spawn(async move {
            let stats = consumer.run(cancel).await;
            (consumer, stats)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
        let (consumer, stats) = handle.await.unwrap();

        let stats = stats.unwrap();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(consumer.pending_leases(), 0);
        assert!(fx
            .objects
            .get("documents", "index/vectors.snapshot")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let fx = Fixture::new();
        let result = IngestConsumer::new(
            fx.queue.clone(),
            Arc::new(HashEmbedder::new(DIM * 2).unwrap()),
            fx.index.clone(),
            fx.metadata.clone(),
            fx.checkpointer(),
            ConsumerConfig::default(),
        );
        assert!(matches!(result, Err(IngestError::Config(_))));
    }
}
