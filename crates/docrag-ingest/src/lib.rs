//! Ingestion for docrag.
//!
//! ## Producer
//! [`IngestService`] reads an uploaded object, extracts and chunks its text
//! and sends one [`QueueMessage`](docrag_types::QueueMessage) per chunk.
//! Chunk ids are derived from the object key and chunk order, so
//! re-ingesting an object produces the same ids.
//!
//! ## Consumer
//! [`IngestConsumer`] drains the queue. Each message moves through
//! `Received -> Embedding -> Indexed -> Committed -> Acknowledged`:
//!
//! 1. A chunk id that already has metadata is a duplicate and is only
//!    acknowledged.
//! 2. The text is embedded off the async runtime.
//! 3. The vector is appended to the shared index.
//! 4. Metadata is written for the new position.
//! 5. The lease waits until the next checkpoint has persisted the index
//!    snapshot, then it is acknowledged.
//!
//! A failure in steps 2-4 leaves the lease to expire so the queue
//! redelivers. On startup, metadata pointing past the loaded snapshot is
//! purged; those messages were never acknowledged and will be redelivered.

pub mod checkpoint;
pub mod consumer;
pub mod error;
pub mod producer;

pub use checkpoint::{Checkpointer, ConsumerCheckpoint};
pub use consumer::{ConsumerConfig, ConsumerStats, IngestConsumer, MessageState, Outcome};
pub use error::{FailureAction, IngestError};
pub use producer::{IngestReport, IngestService, PrefixReport};
