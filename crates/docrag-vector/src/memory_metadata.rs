//! Process-local metadata store with the same semantics as
//! [`RocksMetadataStore`](crate::RocksMetadataStore).

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use docrag_types::MetadataEntry;

use crate::error::VectorError;
use crate::metadata::{DocumentSummary, MetadataStore};

#[derive(Debug, Default)]
struct Inner {
    by_chunk: HashMap<String, MetadataEntry>,
    by_position: BTreeMap<u64, String>,
}

impl Inner {
    fn remove(&mut self, chunk_id: &str) -> Option<MetadataEntry> {
        let entry = self.by_chunk.remove(chunk_id)?;
        self.by_position.remove(&entry.vector_position);
        Some(entry)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn put(&self, entry: &MetadataEntry) -> Result<(), VectorError> {
        let mut inner = self.inner.write()?;
        inner.remove(&entry.chunk_id);
        inner
            .by_position
            .insert(entry.vector_position, entry.chunk_id.clone());
        inner.by_chunk.insert(entry.chunk_id.clone(), entry.clone());
        Ok(())
    }

    fn get_by_position(&self, position: u64) -> Result<Option<MetadataEntry>, VectorError> {
        let inner = self.inner.read()?;
        Ok(inner
            .by_position
            .get(&position)
            .and_then(|chunk_id| inner.by_chunk.get(chunk_id))
            .cloned())
    }

    fn get_by_chunk_id(&self, chunk_id: &str) -> Result<Option<MetadataEntry>, VectorError> {
        Ok(self.inner.read()?.by_chunk.get(chunk_id).cloned())
    }

    fn document_entries(&self, doc_id: &str) -> Result<Vec<MetadataEntry>, VectorError> {
        let mut entries: Vec<MetadataEntry> = self
            .inner
            .read()?
            .by_chunk
            .values()
            .filter(|e| e.doc_id == doc_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(entries)
    }

    fn delete_chunk(&self, chunk_id: &str) -> Result<bool, VectorError> {
        Ok(self.inner.write()?.remove(chunk_id).is_some())
    }

    fn delete_document(&self, doc_id: &str) -> Result<usize, VectorError> {
        let mut inner = self.inner.write()?;
        let chunk_ids: Vec<String> = inner
            .by_chunk
            .values()
            .filter(|e| e.doc_id == doc_id)
            .map(|e| e.chunk_id.clone())
            .collect();
        for chunk_id in &chunk_ids {
            inner.remove(chunk_id);
        }
        Ok(chunk_ids.len())
    }

    fn purge_from_position(&self, position: u64) -> Result<usize, VectorError> {
        let mut inner = self.inner.write()?;
        let chunk_ids: Vec<String> = inner.by_position.range(position..).map(|(_, c)| c.clone()).collect();
        for chunk_id in &chunk_ids {
            inner.remove(chunk_id);
        }
        Ok(chunk_ids.len())
    }

    fn count(&self) -> Result<usize, VectorError> {
        Ok(self.inner.read()?.by_chunk.len())
    }

    fn documents(&self) -> Result<Vec<DocumentSummary>, VectorError> {
        let inner = self.inner.read()?;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in inner.by_chunk.values() {
            *counts.entry(entry.doc_id.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(doc_id, chunks)| DocumentSummary {
                doc_id: doc_id.to_string(),
                chunks,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(chunk: &str, doc: &str, position: u64) -> MetadataEntry {
        MetadataEntry {
            chunk_id: chunk.to_string(),
            doc_id: doc.to_string(),
            vector_position: position,
            text: "text".to_string(),
            source_key: doc.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_one_entry_per_chunk_id() {
        let store = InMemoryMetadataStore::new();
        store.put(&entry("c1", "d", 0)).unwrap();
        store.put(&entry("c1", "d", 3)).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get_by_position(0).unwrap().is_none());
        assert_eq!(store.get_by_position(3).unwrap().unwrap().chunk_id, "c1");
    }

    #[test]
    fn test_purge_and_delete() {
        let store = InMemoryMetadataStore::new();
        store.put(&entry("c0", "d1", 0)).unwrap();
        store.put(&entry("c1", "d2", 1)).unwrap();
        store.put(&entry("c2", "d2", 2)).unwrap();

        assert_eq!(store.purge_from_position(2).unwrap(), 1);
        assert_eq!(store.document_entries("d2").unwrap().len(), 1);
        assert_eq!(store.delete_document("d2").unwrap(), 1);
        assert_eq!(
            store.documents().unwrap(),
            vec![DocumentSummary { doc_id: "d1".to_string(), chunks: 1 }]
        );
    }
}
