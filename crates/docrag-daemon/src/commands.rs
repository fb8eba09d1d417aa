//! Command implementations for docrag.
//!
//! Every command opens the stores under `data_dir` itself. RocksDB takes a
//! per-directory lock, so only one process may hold the queue and metadata
//! stores at a time; `serve` runs the consumer in-process for that reason.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use docrag_embeddings::{load_embedder, EmbeddingModel};
use docrag_extract::{Chunker, ChunkerConfig};
use docrag_ingest::{Checkpointer, ConsumerConfig, ConsumerStats, IngestConsumer, IngestService};
use docrag_retrieval::RetrievalService;
use docrag_storage::{FsObjectStore, ObjectStore, RocksQueue, WorkQueue};
use docrag_types::Settings;
use docrag_vector::{empty_index, share, MetadataStore, RocksMetadataStore, SharedIndex};

use crate::http::{self, AppState};

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    data_dir_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    if let Some(data_dir) = data_dir_override {
        settings.data_dir = data_dir.to_string();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Stores opened from settings.
pub struct Components {
    pub settings: Settings,
    pub objects: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub metadata: Arc<dyn MetadataStore>,
}

impl Components {
    pub fn open(settings: &Settings) -> Result<Self> {
        let data_dir = settings.expanded_data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;
        info!(data_dir = ?data_dir, "Opening stores");

        let queue = RocksQueue::open(
            &settings.queue_path(),
            Duration::from_secs(settings.consumer.visibility_timeout_secs),
        )
        .context("Failed to open queue")?;
        let metadata =
            RocksMetadataStore::open(settings.metadata_path()).context("Failed to open metadata store")?;

        Ok(Self {
            settings: settings.clone(),
            objects: Arc::new(FsObjectStore::new(settings.objects_path())),
            queue: Arc::new(queue),
            metadata: Arc::new(metadata),
        })
    }

    pub fn checkpointer(&self) -> Checkpointer {
        Checkpointer::new(
            self.objects.clone(),
            &self.settings.bucket,
            &self.settings.snapshot_key,
        )
    }

    pub fn embedder(&self) -> Result<Arc<dyn EmbeddingModel>> {
        load_embedder(&self.settings.embedding).context("Failed to load embedding model")
    }

    pub fn ingest_service(&self) -> IngestService {
        IngestService::new(
            self.objects.clone(),
            self.queue.clone(),
            Chunker::new(ChunkerConfig::from(&self.settings.chunking)),
        )
        .with_metadata(self.metadata.clone())
    }

    /// Index from the last snapshot, or empty.
    pub async fn load_index(&self) -> Result<SharedIndex> {
        let index = self
            .checkpointer()
            .load_index(self.settings.index.kind, self.settings.embedding.dimension)
            .await
            .context("Failed to load index")?;
        Ok(share(index))
    }

    pub fn consumer(
        &self,
        embedder: Arc<dyn EmbeddingModel>,
        index: SharedIndex,
    ) -> Result<IngestConsumer> {
        IngestConsumer::new(
            self.queue.clone(),
            embedder,
            index,
            self.metadata.clone(),
            self.checkpointer(),
            ConsumerConfig::from(&self.settings.consumer),
        )
        .context("Failed to start consumer")
    }

    /// Retrieval over an index this process also writes to.
    pub fn retrieval(&self, embedder: Arc<dyn EmbeddingModel>, index: SharedIndex) -> RetrievalService {
        RetrievalService::new(embedder, index, self.metadata.clone())
    }

    /// Read-only retrieval that owns its index and fills it from the
    /// persisted snapshot.
    pub async fn snapshot_retrieval(&self, embedder: Arc<dyn EmbeddingModel>) -> Result<RetrievalService> {
        let index = empty_index(self.settings.index.kind, self.settings.embedding.dimension)
            .context("Failed to create index")?;
        let retrieval = RetrievalService::new(embedder, share(index), self.metadata.clone())
            .with_snapshots(self.checkpointer().snapshots().clone(), self.settings.index.kind);
        retrieval
            .reload_snapshot()
            .await
            .context("Failed to load index snapshot")?;
        Ok(retrieval)
    }
}

/// Upload local files and enqueue their chunks, or ingest an existing prefix.
pub async fn handle_ingest(settings: &Settings, files: &[PathBuf], prefix: Option<&str>) -> Result<()> {
    if files.is_empty() && prefix.is_none() {
        anyhow::bail!("Nothing to ingest: pass files or --prefix");
    }

    let components = Components::open(settings)?;
    let service = components.ingest_service();
    let bucket = &settings.bucket;

    if let Some(prefix) = prefix {
        let report = service.ingest_prefix(bucket, prefix).await?;
        for r in &report.ingested {
            print_ingest_line(&r.key, r.chunks_sent, r.skipped_unsupported);
        }
        for (key, error) in &report.failed {
            println!("{}: FAILED ({})", key, error);
        }
        println!("{} chunks enqueued", report.chunks_sent());
        return Ok(());
    }

    for path in files {
        let key = object_key_for(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        components.objects.put(bucket, &key, bytes).await?;

        match service.ingest_object(bucket, &key).await {
            Ok(r) => print_ingest_line(&r.key, r.chunks_sent, r.skipped_unsupported),
            Err(e) => println!("{}: FAILED ({})", key, e),
        }
    }
    Ok(())
}

fn object_key_for(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .with_context(|| format!("Not a file path: {:?}", path))
}

fn print_ingest_line(key: &str, chunks: usize, skipped: bool) {
    if skipped {
        println!("{}: skipped (unsupported type)", key);
    } else {
        println!("{}: {} chunks", key, chunks);
    }
}

/// Run the consumer. With `once`, stop when a receive comes back empty.
pub async fn run_consumer(settings: &Settings, once: bool) -> Result<ConsumerStats> {
    let components = Components::open(settings)?;
    let embedder = components.embedder()?;
    let index = components.load_index().await?;
    let mut consumer = components.consumer(embedder, index)?;

    let stats = if once {
        while consumer.poll_once().await? > 0 {}
        consumer.checkpoint().await;
        consumer.stats().clone()
    } else {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            trigger.cancel();
        });
        consumer.run(cancel).await?
    };

    println!(
        "committed {} | duplicates {} | dead-lettered {} | acknowledged {} | pending {}",
        stats.committed,
        stats.duplicates,
        stats.dead_lettered,
        stats.acknowledged,
        consumer.pending_leases()
    );
    Ok(stats)
}

pub async fn handle_query(settings: &Settings, query: &str, top_k: Option<usize>) -> Result<()> {
    let components = Components::open(settings)?;
    let retrieval = components.snapshot_retrieval(components.embedder()?).await?;

    let top_k = top_k.unwrap_or(settings.retrieval.default_top_k);
    let results = retrieval.retrieve(query, top_k).await;
    if results.is_empty() {
        println!("No results");
    }
    for (rank, chunk) in results.iter().enumerate() {
        println!("{}. {} (score {:.4})", rank + 1, chunk.chunk_id, chunk.score);
        println!("{}", chunk.chunk_text);
        println!();
    }
    Ok(())
}

/// Serve HTTP and consume the queue against one shared index.
pub async fn start_server(settings: &Settings, addr_override: Option<&str>) -> Result<()> {
    let components = Components::open(settings)?;
    let embedder = components.embedder()?;
    let index = components.load_index().await?;
    let mut consumer = components.consumer(embedder.clone(), index.clone())?;

    let state = AppState {
        retrieval: Arc::new(components.retrieval(embedder, index)),
        ingest: Arc::new(components.ingest_service()),
        bucket: settings.bucket.clone(),
        default_top_k: settings.retrieval.default_top_k,
    };

    let addr = addr_override.unwrap_or(&settings.http.addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let cancel = CancellationToken::new();
    let consumer_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let served = http::serve(listener, state, cancel.clone()).await;
    cancel.cancel();

    match consumer_task.await {
        Ok(Ok(stats)) => info!(committed = stats.committed, "Consumer finished"),
        Ok(Err(e)) => warn!(error = %e, "Consumer exited with error"),
        Err(e) => warn!(error = %e, "Consumer task panicked"),
    }
    served.context("HTTP server error")
}

/// Tombstone a document: its chunks stop resolving at query time.
pub async fn handle_delete(settings: &Settings, doc_id: &str) -> Result<()> {
    let components = Components::open(settings)?;
    let removed = components
        .metadata
        .delete_document(doc_id)
        .context("Failed to delete metadata")?;
    let object_deleted = components.objects.delete(&settings.bucket, doc_id).await?;

    println!(
        "{}: {} chunks removed, object {}",
        doc_id,
        removed,
        if object_deleted { "deleted" } else { "not found" }
    );
    Ok(())
}

pub async fn show_status(settings: &Settings) -> Result<()> {
    let components = Components::open(settings)?;
    let queue = components.queue.stats().await?;
    let documents = components.metadata.documents()?;
    let chunks = components.metadata.count()?;
    let checkpointer = components.checkpointer();
    let checkpoint = checkpointer.load_record().await?;
    let index = checkpointer
        .load_index(settings.index.kind, settings.embedding.dimension)
        .await?
        .stats();

    println!("Data directory: {:?}", settings.expanded_data_dir());
    println!(
        "Queue: {} ready, {} in flight, {} dead-lettered",
        queue.ready, queue.in_flight, queue.dead_lettered
    );
    match checkpoint {
        Some(c) => println!(
            "Index: {} vectors in snapshot ({} orphaned), last checkpoint {}",
            c.snapshot_count, c.orphaned_positions, c.updated_at
        ),
        None => println!("Index: no checkpoint yet"),
    }
    println!(
        "Loaded index: {} with {} vectors of dimension {} (~{} bytes)",
        index.kind, index.vector_count, index.dimension, index.size_bytes
    );
    println!("Metadata: {} chunks across {} documents", chunks, documents.len());
    for doc in documents {
        println!("  {} ({} chunks)", doc.doc_id, doc.chunks);
    }

    for dead in components.queue.dead_letters(10).await? {
        println!(
            "Dead letter #{} after {} receives: {}",
            dead.sequence, dead.receive_count, dead.reason
        );
    }
    Ok(())
}

pub fn show_config(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
