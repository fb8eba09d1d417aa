//! Shared types for the docrag ingestion and retrieval pipeline.
//!
//! This crate provides the domain model used across all crates:
//! - [`Chunk`]: a bounded-size segment of extracted document text
//! - [`QueueMessage`]: the unit of work handed from the producer to the consumer
//! - [`MetadataEntry`]: text and provenance stored for each indexed vector
//! - [`FileType`]: the type hint used by extraction and chunking
//! - [`Settings`]: layered configuration
//! - [`DocragError`]: shared error type for configuration and serialization

pub mod chunk;
pub mod config;
pub mod error;
pub mod file_type;
pub mod message;
pub mod metadata;

pub use chunk::{chunk_id_for, Chunk};
pub use config::{
    ChunkingSettings, ConsumerSettings, EmbeddingBackend, EmbeddingSettings, HttpSettings,
    IndexKind, IndexSettings, RetrievalSettings, Settings,
};
pub use error::DocragError;
pub use file_type::FileType;
pub use message::QueueMessage;
pub use metadata::MetadataEntry;
