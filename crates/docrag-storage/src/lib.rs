//! Queue and object storage collaborators for docrag.
//!
//! - [`WorkQueue`]: at-least-once delivery with leases, receive counts and
//!   a dead-letter path. [`RocksQueue`] is durable, [`InMemoryQueue`] is
//!   for tests and single-shot runs.
//! - [`ObjectStore`]: bucket/key blobs for uploads and index snapshots.
//!   [`FsObjectStore`] maps them onto a directory tree.

pub mod column_families;
pub mod error;
pub mod fs_store;
pub mod keys;
pub mod lease;
pub mod memory_queue;
pub mod memory_store;
pub mod object_store;
pub mod queue;
pub mod rocks_queue;

pub use error::StorageError;
pub use fs_store::FsObjectStore;
pub use keys::MessageKey;
pub use memory_queue::InMemoryQueue;
pub use memory_store::InMemoryObjectStore;
pub use object_store::{get_optional, ObjectStore};
pub use queue::{DeadLetter, Delivery, Lease, QueueStats, WorkQueue};
pub use rocks_queue::RocksQueue;
