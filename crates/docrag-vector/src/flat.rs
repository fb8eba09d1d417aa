//! Exact index: exhaustive squared-Euclidean scan.

use docrag_embeddings::model::squared_l2;
use docrag_embeddings::Embedding;
use tracing::debug;

use crate::error::VectorError;
use crate::index::{check_dimension, IndexStats, SearchResult, VectorIndex};
use crate::snapshot::IndexSnapshot;

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major, `len * dimension` floats
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, VectorError> {
        snapshot.validate()?;
        Ok(Self {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors,
        })
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension.max(1))
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.vectors.len() / self.dimension
        }
    }

    fn add(&mut self, embedding: &Embedding) -> Result<u64, VectorError> {
        check_dimension(self.dimension, embedding)?;
        let position = self.len() as u64;
        self.vectors.extend_from_slice(embedding.as_slice());
        debug!(position, "Added vector");
        Ok(position)
    }

    fn search(&self, query: &Embedding, k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.dimension, query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<SearchResult> = self
            .rows()
            .enumerate()
            .map(|(position, row)| SearchResult {
                position: position as u64,
                distance: squared_l2(query.as_slice(), row),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);
        Ok(results)
    }

    fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot::new(self.dimension, self.vectors.clone())
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: "flat".to_string(),
            vector_count: self.len(),
            dimension: self.dimension,
            size_bytes: (self.vectors.len() * std::mem::size_of::<f32>()) as u64,
        }
    }
}
