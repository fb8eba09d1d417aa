//! Metadata store.
//!
//! Three column families keep lookups point reads:
//! - chunk_meta: `chunk_id` -> JSON [`MetadataEntry`]
//! - position_index: big-endian `vector_position` -> `chunk_id`
//! - doc_chunks: `doc_id \0 chunk_id` -> empty (per-document listing)
//!
//! Every mutation is a single `WriteBatch`, so the three never disagree.

use std::path::Path;

use docrag_types::MetadataEntry;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::error::VectorError;

pub const CF_CHUNK_META: &str = "chunk_meta";
pub const CF_POSITION_INDEX: &str = "position_index";
pub const CF_DOC_CHUNKS: &str = "doc_chunks";

/// Chunks held for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub chunks: usize,
}

/// Durable chunk metadata keyed by chunk id and by vector position.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace the entry for `entry.chunk_id`. A previous entry
    /// for the same chunk id at another position is superseded.
    fn put(&self, entry: &MetadataEntry) -> Result<(), VectorError>;

    fn get_by_position(&self, position: u64) -> Result<Option<MetadataEntry>, VectorError>;

    fn get_by_chunk_id(&self, chunk_id: &str) -> Result<Option<MetadataEntry>, VectorError>;

    /// Entries of one document, sorted by chunk id.
    fn document_entries(&self, doc_id: &str) -> Result<Vec<MetadataEntry>, VectorError>;

    /// Remove one entry. Returns whether it existed.
    fn delete_chunk(&self, chunk_id: &str) -> Result<bool, VectorError>;

    /// Remove every entry of a document. Returns how many were removed.
    fn delete_document(&self, doc_id: &str) -> Result<usize, VectorError>;

    /// Remove every entry with `vector_position >= position`.
    fn purge_from_position(&self, position: u64) -> Result<usize, VectorError>;

    fn count(&self) -> Result<usize, VectorError>;

    /// Documents with at least one entry, sorted by id.
    fn documents(&self) -> Result<Vec<DocumentSummary>, VectorError>;
}

fn doc_key(doc_id: &str, chunk_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(doc_id.len() + chunk_id.len() + 1);
    key.extend_from_slice(doc_id.as_bytes());
    key.push(0);
    key.extend_from_slice(chunk_id.as_bytes());
    key
}

fn split_doc_key(key: &[u8]) -> Option<(&[u8], &[u8])> {
    let sep = key.iter().position(|b| *b == 0)?;
    Some((&key[..sep], &key[sep + 1..]))
}

pub struct RocksMetadataStore {
    db: DB,
}

impl RocksMetadataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_CHUNK_META, CF_POSITION_INDEX, CF_DOC_CHUNKS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        info!(path = ?path, "Opened metadata store");
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VectorError::ColumnFamilyNotFound(name.to_string()))
    }

    fn load(&self, chunk_id: &[u8]) -> Result<Option<MetadataEntry>, VectorError> {
        match self.db.get_cf(self.cf(CF_CHUNK_META)?, chunk_id)? {
            Some(bytes) => Ok(Some(MetadataEntry::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Queue deletion of an entry and both of its index keys.
    fn delete_entry(&self, batch: &mut WriteBatch, entry: &MetadataEntry) -> Result<(), VectorError> {
        batch.delete_cf(self.cf(CF_CHUNK_META)?, entry.chunk_id.as_bytes());
        batch.delete_cf(self.cf(CF_POSITION_INDEX)?, entry.vector_position.to_be_bytes());
        batch.delete_cf(self.cf(CF_DOC_CHUNKS)?, doc_key(&entry.doc_id, &entry.chunk_id));
        Ok(())
    }
}

impl MetadataStore for RocksMetadataStore {
    fn put(&self, entry: &MetadataEntry) -> Result<(), VectorError> {
        let mut batch = WriteBatch::default();

        if let Some(previous) = self.load(entry.chunk_id.as_bytes())? {
            if previous.vector_position != entry.vector_position {
                batch.delete_cf(
                    self.cf(CF_POSITION_INDEX)?,
                    previous.vector_position.to_be_bytes(),
                );
            }
        }

        batch.put_cf(self.cf(CF_CHUNK_META)?, entry.chunk_id.as_bytes(), entry.to_bytes()?);
        batch.put_cf(
            self.cf(CF_POSITION_INDEX)?,
            entry.vector_position.to_be_bytes(),
            entry.chunk_id.as_bytes(),
        );
        batch.put_cf(self.cf(CF_DOC_CHUNKS)?, doc_key(&entry.doc_id, &entry.chunk_id), b"");
        self.db.write(batch)?;

        debug!(chunk_id = %entry.chunk_id, position = entry.vector_position, "Stored metadata");
        Ok(())
    }

    fn get_by_position(&self, position: u64) -> Result<Option<MetadataEntry>, VectorError> {
        let Some(chunk_id) = self
            .db
            .get_cf(self.cf(CF_POSITION_INDEX)?, position.to_be_bytes())?
        else {
            return Ok(None);
        };
        // A stale pointer (superseded entry) resolves to nothing
        Ok(self
            .load(&chunk_id)?
            .filter(|entry| entry.vector_position == position))
    }

    fn get_by_chunk_id(&self, chunk_id: &str) -> Result<Option<MetadataEntry>, VectorError> {
        self.load(chunk_id.as_bytes())
    }

    fn document_entries(&self, doc_id: &str) -> Result<Vec<MetadataEntry>, VectorError> {
        let prefix = doc_key(doc_id, "");
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf(CF_DOC_CHUNKS)?, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(entry) = self.load(&key[prefix.len()..])? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn delete_chunk(&self, chunk_id: &str) -> Result<bool, VectorError> {
        let Some(entry) = self.load(chunk_id.as_bytes())? else {
            return Ok(false);
        };
        let mut batch = WriteBatch::default();
        self.delete_entry(&mut batch, &entry)?;
        self.db.write(batch)?;

        debug!(chunk_id, position = entry.vector_position, "Deleted chunk metadata");
        Ok(true)
    }

    fn delete_document(&self, doc_id: &str) -> Result<usize, VectorError> {
        let prefix = doc_key(doc_id, "");
        let docs = self.cf(CF_DOC_CHUNKS)?;

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self
            .db
            .iterator_cf(docs, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            batch.delete_cf(docs, &key);
            if let Some(entry) = self.load(&key[prefix.len()..])? {
                self.delete_entry(&mut batch, &entry)?;
                removed += 1;
            }
        }
        self.db.write(batch)?;

        info!(doc_id, removed, "Deleted document metadata");
        Ok(removed)
    }

    fn purge_from_position(&self, position: u64) -> Result<usize, VectorError> {
        let positions = self.cf(CF_POSITION_INDEX)?;
        let start = position.to_be_bytes();

        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self
            .db
            .iterator_cf(positions, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, chunk_id) = item?;
            batch.delete_cf(positions, &key);
            if let Some(entry) = self.load(&chunk_id)? {
                if entry.vector_position >= position {
                    self.delete_entry(&mut batch, &entry)?;
                    removed += 1;
                }
            }
        }
        self.db.write(batch)?;

        if removed > 0 {
            debug!(from = position, removed, "Purged metadata");
        }
        Ok(removed)
    }

    fn count(&self) -> Result<usize, VectorError> {
        Ok(self
            .db
            .iterator_cf(self.cf(CF_CHUNK_META)?, IteratorMode::Start)
            .count())
    }

    fn documents(&self) -> Result<Vec<DocumentSummary>, VectorError> {
        let mut summaries: Vec<DocumentSummary> = Vec::new();
        for item in self
            .db
            .iterator_cf(self.cf(CF_DOC_CHUNKS)?, IteratorMode::Start)
        {
            let (key, _) = item?;
            let Some((doc_id, _)) = split_doc_key(&key) else {
                continue;
            };
            let doc_id = String::from_utf8_lossy(doc_id);
            match summaries.last_mut() {
                Some(last) if last.doc_id == doc_id => last.chunks += 1,
                _ => summaries.push(DocumentSummary {
                    doc_id: doc_id.into_owned(),
                    chunks: 1,
                }),
            }
        }
        Ok(summaries)
    }
}
