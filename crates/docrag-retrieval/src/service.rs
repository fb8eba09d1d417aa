//! Retrieval service.

use std::sync::Arc;

use docrag_embeddings::EmbeddingModel;
use docrag_types::IndexKind;
use docrag_vector::{MetadataStore, SearchResult, SharedIndex, SnapshotStore, VectorError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RetrievalError;

/// One ranked hit. Lower `score` means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_text: String,
    /// Squared L2 distance between query and chunk embeddings
    pub score: f32,
    pub doc_id: String,
    pub source_key: String,
    pub chunk_id: String,
}

pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingModel>,
    index: SharedIndex,
    metadata: Arc<dyn MetadataStore>,
    snapshots: Option<(SnapshotStore, IndexKind)>,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        index: SharedIndex,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            metadata,
            snapshots: None,
        }
    }

    /// Enable [`reload_snapshot`](Self::reload_snapshot) for read-only
    /// deployments that do not share an index with a consumer.
    pub fn with_snapshots(mut self, snapshots: SnapshotStore, kind: IndexKind) -> Self {
        self.snapshots = Some((snapshots, kind));
        self
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Return up to `top_k` chunks ordered from most to least similar.
    ///
    /// Positions with no metadata (orphans, deleted documents, or a commit
    /// still in progress) are skipped, so fewer than `top_k` may come back.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievedChunk> {
        if query.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        match self.try_retrieve(query, top_k).await {
            Ok(chunks) => {
                info!(top_k, results = chunks.len(), "Retrieval complete");
                chunks
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, returning no results");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let embedder = self.embedder.clone();
        let query = query.to_string();
        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&query)).await??;

        // Flat search is an exhaustive scan; keep it off the runtime threads
        let index = self.index.clone();
        let hits = tokio::task::spawn_blocking(move || -> Result<Vec<SearchResult>, VectorError> {
            let index = index.read()?;
            if index.is_empty() {
                return Ok(Vec::new());
            }
            index.search(&embedding, top_k)
        })
        .await??;

        let mut chunks = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.metadata.get_by_position(hit.position)? {
                Some(entry) => chunks.push(RetrievedChunk {
                    chunk_text: entry.text,
                    score: hit.distance,
                    doc_id: entry.doc_id,
                    source_key: entry.source_key,
                    chunk_id: entry.chunk_id,
                }),
                None => {
                    debug!(position = hit.position, "No metadata for position, skipping");
                }
            }
        }
        Ok(chunks)
    }

    /// Replace the in-memory index with the latest persisted snapshot.
    /// Returns the number of vectors loaded.
    pub async fn reload_snapshot(&self) -> Result<usize, RetrievalError> {
        let Some((snapshots, kind)) = &self.snapshots else {
            return Err(RetrievalError::Vector(VectorError::Snapshot(
                "no snapshot source configured".to_string(),
            )));
        };

        let dimension = self.index.read().map_err(VectorError::from)?.dimension();
        let fresh = snapshots.load(*kind, dimension).await?;
        let count = fresh.len();
        *self.index.write().map_err(VectorError::from)? = fresh;

        info!(vectors = count, key = %snapshots.key(), "Reloaded index snapshot");
        Ok(count)
    }
}
