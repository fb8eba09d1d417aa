//! Approximate index backed by a usearch HNSW graph.
//!
//! Same contract as [`FlatIndex`](crate::FlatIndex): squared-Euclidean
//! distance, positions as keys, results ascending by distance. Search is
//! approximate, so a true nearest neighbour can be missed; recall rises
//! with `expansion_search` at the cost of query latency. The graph is not
//! persisted: snapshots carry the raw vectors and the graph is rebuilt on
//! load, which keeps snapshots interchangeable between index kinds.
//!
//! Parameters:
//! - M = 16 (connections per layer)
//! - ef_construction = 200
//! - ef_search = 100

use docrag_embeddings::Embedding;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::index::{check_dimension, IndexStats, SearchResult, VectorIndex};
use crate::snapshot::IndexSnapshot;

#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub dimension: usize,
    /// M
    pub connectivity: usize,
    /// ef_construction
    pub expansion_add: usize,
    /// ef_search
    pub expansion_search: usize,
    /// Initial reservation; grows by doubling
    pub initial_capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            initial_capacity: 1024,
        }
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

pub struct HnswIndex {
    index: Index,
    config: HnswConfig,
    /// Row-major copy for snapshots
    vectors: Vec<f32>,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Result<Self, VectorError> {
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.initial_capacity)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        Ok(Self {
            index,
            config,
            vectors: Vec::new(),
        })
    }

    /// Rebuild the graph from a snapshot's vectors.
    pub fn from_snapshot(config: HnswConfig, snapshot: IndexSnapshot) -> Result<Self, VectorError> {
        snapshot.validate()?;
        if snapshot.dimension != config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: config.dimension,
                actual: snapshot.dimension,
            });
        }

        let capacity = config.initial_capacity.max(snapshot.count as usize);
        let mut index = Self::new(HnswConfig {
            initial_capacity: capacity,
            ..config
        })?;
        for row in snapshot.vectors.chunks_exact(snapshot.dimension.max(1)) {
            index.insert(row)?;
        }

        info!(vectors = index.len(), "Rebuilt HNSW graph from snapshot");
        Ok(index)
    }

    fn insert(&mut self, values: &[f32]) -> Result<u64, VectorError> {
        let position = self.len() as u64;

        if self.index.size() >= self.index.capacity() {
            let grown = (self.index.capacity() * 2).max(self.config.initial_capacity);
            self.index
                .reserve(grown)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(capacity = grown, "Grew HNSW capacity");
        }

        self.index
            .add(position, values)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        self.vectors.extend_from_slice(values);
        Ok(position)
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn add(&mut self, embedding: &Embedding) -> Result<u64, VectorError> {
        check_dimension(self.config.dimension, embedding)?;
        let position = self.insert(embedding.as_slice())?;
        debug!(position, "Added vector");
        Ok(position)
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.config.dimension, query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query.as_slice(), k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let mut results: Vec<SearchResult> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&position, &distance)| SearchResult { position, distance })
            .collect();
        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });

        debug!(k, found = results.len(), "Search complete");
        Ok(results)
    }

    fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot::new(self.config.dimension, self.vectors.clone())
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: "hnsw".to_string(),
            vector_count: self.len(),
            dimension: self.config.dimension,
            size_bytes: self.index.memory_usage() as u64,
        }
    }
}
