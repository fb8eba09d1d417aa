//! Feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed (FNV-1a, 64 bit) into one of
//! `dimension` buckets with a sign taken from a high hash bit, and the
//! bucket counts are normalized to unit length. Texts that share vocabulary
//! land close together, which is enough for lexical retrieval without a
//! model download. The hash is fixed, so vectors are stable across builds
//! and platforms.

use tracing::trace;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            info: ModelInfo {
                name: format!("feature-hash-{}", dimension),
                dimension,
                max_sequence_length: usize::MAX,
            },
        })
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Lowercase runs of alphanumeric characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let dimension = self.info.dimension;
        let mut values = vec![0.0f32; dimension];
        let mut tokens = 0usize;

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
            tokens += 1;
        }

        trace!(tokens, dimension, "Hashed text");
        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(128).unwrap();
        let a = embedder.embed("The quick brown fox").unwrap();
        let b = embedder.embed("The quick brown fox").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(128).unwrap();
        let a = embedder.embed("Gear ratios, torque!").unwrap();
        let b = embedder.embed("gear RATIOS torque").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unit_length_and_dimension() {
        let embedder = HashEmbedder::new(384).unwrap();
        let emb = embedder.embed("photosynthesis converts light into energy").unwrap();
        assert_eq!(emb.dimension(), 384);
        let norm: f32 = emb.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::new(384).unwrap();
        let doc = embedder
            .embed("volcanoes erupt molten lava from the mantle")
            .unwrap();
        let related = embedder.embed("how does lava erupt from volcanoes").unwrap();
        let unrelated = embedder.embed("quarterly sales figures for retail").unwrap();

        assert!(doc.squared_l2(&related) < doc.squared_l2(&unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16).unwrap();
        let emb = embedder.embed("  ...  ").unwrap();
        assert!(emb.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fnv_reference_value() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
