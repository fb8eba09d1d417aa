//! Vector index trait and types.

use docrag_embeddings::Embedding;
use docrag_types::IndexKind;

use crate::error::VectorError;
use crate::flat::FlatIndex;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::snapshot::IndexSnapshot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub position: u64,
    /// Squared Euclidean distance; lower is more similar
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub kind: String,
    pub vector_count: usize,
    pub dimension: usize,
    /// Approximate in-memory footprint of the stored vectors
    pub size_bytes: u64,
}

/// Append-only nearest-neighbour index.
///
/// `add` takes `&mut self`: writers are serialized by whoever owns the
/// index (see [`SharedIndex`](crate::SharedIndex)).
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector and return its position (the count before insertion).
    fn add(&mut self, embedding: &Embedding) -> Result<u64, VectorError>;

    /// Up to `k` nearest positions, ascending by distance.
    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// All vectors in position order.
    fn to_snapshot(&self) -> IndexSnapshot;

    fn stats(&self) -> IndexStats;
}

pub(crate) fn check_dimension(expected: usize, embedding: &Embedding) -> Result<(), VectorError> {
    if embedding.dimension() != expected {
        return Err(VectorError::DimensionMismatch {
            expected,
            actual: embedding.dimension(),
        });
    }
    Ok(())
}

pub fn empty_index(kind: IndexKind, dimension: usize) -> Result<Box<dyn VectorIndex>, VectorError> {
    Ok(match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension)),
        IndexKind::Hnsw => Box::new(HnswIndex::new(HnswConfig::new(dimension))?),
    })
}

pub fn index_from_snapshot(
    kind: IndexKind,
    snapshot: IndexSnapshot,
) -> Result<Box<dyn VectorIndex>, VectorError> {
    Ok(match kind {
        IndexKind::Flat => Box::new(FlatIndex::from_snapshot(snapshot)?),
        IndexKind::Hnsw => Box::new(HnswIndex::from_snapshot(
            HnswConfig::new(snapshot.dimension),
            snapshot,
        )?),
    })
}
