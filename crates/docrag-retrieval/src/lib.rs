//! Query-time retrieval.
//!
//! Embeds a query, searches the shared vector index and resolves each hit
//! against the metadata store. Retrieval is best-effort: backend and store
//! failures produce an empty result rather than an error.

pub mod error;
pub mod service;

pub use error::RetrievalError;
pub use service::{RetrievalService, RetrievedChunk};
