//! Embedding model trait and vector type.

use crate::error::EmbeddingError;

/// A unit-length embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Wrap and normalize to unit length. The zero vector is kept as-is.
    pub fn new(values: Vec<f32>) -> Self {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            Self {
                values: values.into_iter().map(|x| x / norm).collect(),
            }
        } else {
            Self { values }
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Squared Euclidean distance. For unit vectors this is `2 - 2 * cos`.
    pub fn squared_l2(&self, other: &Embedding) -> f32 {
        squared_l2(&self.values, &other.values)
    }

    /// Cosine similarity of two unit vectors; 0.0 on dimension mismatch.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Squared Euclidean distance over the common prefix of two slices.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// e.g. "all-MiniLM-L6-v2"
    pub name: String,
    pub dimension: usize,
    /// Longest input in tokens; `usize::MAX` when unbounded
    pub max_sequence_length: usize,
}

/// A deterministic text-to-vector function of fixed dimension.
///
/// Implementations are shared across the consumer and retrieval paths,
/// so they must be `Send + Sync`.
pub trait EmbeddingModel: Send + Sync {
    fn info(&self) -> &ModelInfo;

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Default calls [`embed`](Self::embed) per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
