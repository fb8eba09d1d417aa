//! End-to-end test infrastructure for docrag.
//!
//! Provides a shared TestHarness over on-disk stores (RocksDB queue and
//! metadata, filesystem object store) so tests can crash and restart the
//! pipeline between steps.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docrag_embeddings::{EmbeddingModel, HashEmbedder};
use docrag_extract::{Chunker, ChunkerConfig};
use docrag_ingest::{Checkpointer, ConsumerConfig, IngestConsumer, IngestService};
use docrag_retrieval::RetrievalService;
use docrag_storage::{FsObjectStore, ObjectStore, RocksQueue};
use docrag_types::IndexKind;
use docrag_vector::{share, MetadataStore, RocksMetadataStore, SharedIndex};

pub const BUCKET: &str = "documents";
pub const SNAPSHOT_KEY: &str = "index/vectors.snapshot";
pub const DIMENSION: usize = 256;

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub root: PathBuf,
    pub kind: IndexKind,
    pub objects: Arc<FsObjectStore>,
    pub queue: Arc<RocksQueue>,
    pub metadata: Arc<dyn MetadataStore>,
    pub embedder: Arc<dyn EmbeddingModel>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_kind(IndexKind::Flat)
    }

    pub fn with_kind(kind: IndexKind) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let (queue, metadata) = open_databases(&root);

        Self {
            objects: Arc::new(FsObjectStore::new(root.join("objects"))),
            queue,
            metadata,
            embedder: Arc::new(HashEmbedder::new(DIMENSION).expect("Failed to build embedder")),
            kind,
            root,
            _temp_dir: temp_dir,
        }
    }

    /// Simulate a process crash: close both databases and reopen them.
    /// Anything holding the old handles must be dropped first.
    pub fn restart(self) -> Self {
        let Self {
            _temp_dir,
            root,
            kind,
            objects,
            queue,
            metadata,
            embedder,
        } = self;
        drop(queue);
        drop(metadata);
        let (queue, metadata) = open_databases(&root);

        Self {
            _temp_dir,
            root,
            kind,
            objects,
            queue,
            metadata,
            embedder,
        }
    }

    pub async fn upload(&self, key: &str, bytes: &[u8]) {
        self.objects
            .put(BUCKET, key, bytes.to_vec())
            .await
            .expect("Failed to upload object");
    }

    pub fn ingest_service(&self, chunker: ChunkerConfig) -> IngestService {
        IngestService::new(self.objects.clone(), self.queue.clone(), Chunker::new(chunker))
            .with_metadata(self.metadata.clone())
    }

    pub fn checkpointer(&self) -> Checkpointer {
        Checkpointer::new(self.objects.clone(), BUCKET, SNAPSHOT_KEY)
    }

    /// Load the index from the last snapshot and build a consumer over it.
    pub async fn consumer(&self, save_interval: usize) -> (IngestConsumer, SharedIndex) {
        let index = share(
            self.checkpointer()
                .load_index(self.kind, DIMENSION)
                .await
                .expect("Failed to load index"),
        );
        let consumer = IngestConsumer::new(
            self.queue.clone(),
            self.embedder.clone(),
            index.clone(),
            self.metadata.clone(),
            self.checkpointer(),
            consumer_config(save_interval),
        )
        .expect("Failed to build consumer");
        (consumer, index)
    }

    pub fn retrieval(&self, index: SharedIndex) -> RetrievalService {
        RetrievalService::new(self.embedder.clone(), index, self.metadata.clone())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn open_databases(root: &std::path::Path) -> (Arc<RocksQueue>, Arc<dyn MetadataStore>) {
    let queue = RocksQueue::open(&root.join("queue"), Duration::from_secs(300))
        .expect("Failed to open queue");
    let metadata =
        RocksMetadataStore::open(root.join("metadata")).expect("Failed to open metadata store");
    (Arc::new(queue), Arc::new(metadata))
}

/// Zero wait so polls return immediately in tests.
pub fn consumer_config(save_interval: usize) -> ConsumerConfig {
    ConsumerConfig {
        save_interval,
        receive_batch: 4,
        wait: Duration::ZERO,
        max_receives: 3,
        flush_idle: true,
    }
}

/// Poll until a receive comes back empty.
pub async fn drain(consumer: &mut IngestConsumer) {
    while consumer
        .poll_once()
        .await
        .expect("Failed to poll queue")
        > 0
    {}
}

/// One paragraph per vocabulary, `words` words long. Disjoint vocabularies
/// keep hash embeddings well apart.
pub fn distinct_paragraphs(topics: &[&[&str]], words: usize) -> Vec<String> {
    topics
        .iter()
        .map(|vocab| {
            (0..words)
                .map(|i| vocab[i % vocab.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}
