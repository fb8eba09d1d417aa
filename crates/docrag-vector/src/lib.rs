//! # docrag-vector
//!
//! Append-only vector index plus the metadata that makes its positions
//! meaningful.
//!
//! ## Index
//! - [`FlatIndex`]: exact squared-Euclidean scan over every vector
//! - [`HnswIndex`]: approximate usearch HNSW graph with the same ordering
//!   contract; see its docs for the recall trade-off
//!
//! Positions are dense, 0-based and assigned in insertion order. Loading a
//! snapshot of `N` vectors continues numbering at `N`.
//!
//! ## Metadata
//! [`MetadataStore`] maps chunk ids and vector positions to
//! [`MetadataEntry`](docrag_types::MetadataEntry)s. Position lookups are
//! point reads on a secondary index.

pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod memory_metadata;
pub mod metadata;
pub mod shared;
pub mod snapshot;

pub use error::VectorError;
pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{empty_index, index_from_snapshot, IndexStats, SearchResult, VectorIndex};
pub use memory_metadata::InMemoryMetadataStore;
pub use metadata::{
    DocumentSummary, MetadataStore, RocksMetadataStore, CF_CHUNK_META, CF_DOC_CHUNKS,
    CF_POSITION_INDEX,
};
pub use shared::{share, SharedIndex};
pub use snapshot::{load_or_empty, IndexSnapshot, SnapshotStore, SNAPSHOT_VERSION};
