//! Shared index handle.
//!
//! One process owns one index. The consumer is its only writer; retrieval
//! takes read locks. Lock poisoning surfaces as [`VectorError::LockPoisoned`].

use std::sync::{Arc, RwLock};

use crate::index::VectorIndex;

pub type SharedIndex = Arc<RwLock<Box<dyn VectorIndex>>>;

pub fn share(index: Box<dyn VectorIndex>) -> SharedIndex {
    Arc::new(RwLock::new(index))
}
