//! Text chunking.
//!
//! Two policies:
//! - tabular text is split into fixed row groups
//! - everything else is split into paragraphs on blank lines, which are
//!   accumulated greedily until the word count exceeds `max_words`; the
//!   paragraph that overflows stays in the chunk it overflowed
//!
//! Both are pure functions of their input, so chunk boundaries (and with
//! them chunk ids) are reproducible.

use chrono::{DateTime, Utc};
use docrag_types::{Chunk, ChunkingSettings, FileType};
use tracing::debug;

/// Chunking limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Word budget per prose chunk (overflow-inclusive)
    pub max_words: usize,
    /// Rows per tabular chunk
    pub table_rows: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_words: 200,
            table_rows: 10,
        }
    }
}

impl From<&ChunkingSettings> for ChunkerConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_words: settings.max_words,
            table_rows: settings.table_rows,
        }
    }
}

/// Split text into trimmed, non-empty paragraphs separated by blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    paragraphs
}

/// Greedy paragraph accumulation with an overflow-inclusive word budget.
pub fn chunk_paragraphs(text: &str, max_words: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut words = 0usize;

    for paragraph in split_paragraphs(text) {
        words += paragraph.split_whitespace().count();
        current.push(paragraph);

        if words > max_words {
            chunks.push(current.join("\n\n"));
            current.clear();
            words = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }

    chunks
}

/// Fixed row groups, row order preserved. Blank lines are not rows.
pub fn chunk_rows(text: &str, rows_per_chunk: usize) -> Vec<String> {
    let rows: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    rows.chunks(rows_per_chunk.max(1))
        .map(|group| group.join("\n"))
        .collect()
}

/// Chunk text according to its file type.
pub fn chunk_text(text: &str, file_type: &FileType, config: &ChunkerConfig) -> Vec<String> {
    if file_type.is_tabular() {
        chunk_rows(text, config.table_rows)
    } else {
        chunk_paragraphs(text, config.max_words)
    }
}

/// Turns extracted text into [`Chunk`]s with deterministic ids.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Chunk a whole document. All chunks share `timestamp`.
    pub fn chunk_document(
        &self,
        text: &str,
        file_type: &FileType,
        doc_id: &str,
        source_key: &str,
        timestamp: DateTime<Utc>,
    ) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = chunk_text(text, file_type, &self.config)
            .into_iter()
            .enumerate()
            .map(|(seq, text)| Chunk::new(doc_id, source_key, text, seq, timestamp))
            .collect();

        debug!(
            doc_id = %doc_id,
            file_type = %file_type,
            chunks = chunks.len(),
            "Chunked document"
        );
        chunks
    }
}
