//! # docrag-embeddings
//!
//! Maps chunk text to fixed-dimension vectors.
//!
//! Two backends implement [`EmbeddingModel`]:
//! - [`HashEmbedder`]: deterministic feature hashing, no model files,
//!   any dimension. The default backend and the one used in tests.
//! - [`CandleEmbedder`]: all-MiniLM-L6-v2 run locally through Candle,
//!   with model files cached from the Hugging Face Hub.
//!
//! Every backend is deterministic for a fixed model version and returns
//! unit-length vectors of exactly `info().dimension` floats.

pub mod cache;
pub mod candle;
pub mod error;
pub mod hashing;
pub mod model;

use std::sync::Arc;

use docrag_types::{EmbeddingBackend, EmbeddingSettings};
use tracing::info;

pub use crate::candle::CandleEmbedder;
pub use cache::{get_or_download_model, ModelCache, ModelPaths, MODEL_FILES};
pub use error::EmbeddingError;
pub use hashing::HashEmbedder;
pub use model::{Embedding, EmbeddingModel, ModelInfo};

/// Build the configured backend.
///
/// Fails with [`EmbeddingError::DimensionMismatch`] when the loaded model
/// does not produce `settings.dimension` floats.
pub fn load_embedder(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    let model: Arc<dyn EmbeddingModel> = match settings.backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(settings.dimension)?),
        EmbeddingBackend::Candle => {
            let cache = ModelCache::for_repo(&settings.model_repo);
            Arc::new(CandleEmbedder::load(&cache)?)
        }
    };

    let dimension = model.info().dimension;
    if dimension != settings.dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: settings.dimension,
            actual: dimension,
        });
    }

    info!(model = %model.info().name, dimension, "Embedding backend ready");
    Ok(model)
}
