//! # docrag-extract
//!
//! Converts uploaded file payloads into plain text and splits that text
//! into chunks sized for embedding.
//!
//! ## Extraction
//! - `pdf`, `docx`: flowing text first, then each table as a `TABLE:` block
//! - `txt`: UTF-8 text as-is
//! - `csv`, `xlsx`: normalized to CSV text (header + rows)
//! - anything else: [`Extraction::Unsupported`], never an error
//!
//! ## Chunking
//! - tabular types: fixed row groups
//! - everything else: greedy paragraph accumulation with an
//!   overflow-inclusive word budget

pub mod chunker;
pub mod docx;
pub mod error;
pub mod extractor;
pub mod pdf;
pub mod tabular;

pub use chunker::{chunk_paragraphs, chunk_rows, chunk_text, split_paragraphs, Chunker, ChunkerConfig};
pub use error::ExtractError;
pub use extractor::{extract, Extraction, TABLE_MARKER};
