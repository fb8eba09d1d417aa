//! Extraction dispatch by file type.

use docrag_types::FileType;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::{docx, pdf, tabular};

/// Marker line that starts every table block.
pub const TABLE_MARKER: &str = "TABLE:";

/// Result of extracting a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Plain text ready for chunking
    Text(String),
    /// The type hint has no extractor; callers skip the file
    Unsupported(String),
}

impl Extraction {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Extraction::Unsupported(_))
    }

    /// Text if extraction was supported
    pub fn into_text(self) -> Option<String> {
        match self {
            Extraction::Text(text) => Some(text),
            Extraction::Unsupported(_) => None,
        }
    }
}

/// Extract plain text from a raw payload.
///
/// Pure transform: no network or storage access.
pub fn extract(bytes: &[u8], file_type: &FileType) -> Result<Extraction, ExtractError> {
    debug!(file_type = %file_type, bytes = bytes.len(), "Extracting text");

    let text = match file_type {
        FileType::Pdf => pdf::extract_pdf(bytes)?,
        FileType::Docx => docx::extract_docx(bytes)?,
        FileType::Txt => String::from_utf8(bytes.to_vec())?,
        FileType::Csv => tabular::extract_csv(bytes)?,
        FileType::Xlsx => tabular::extract_xlsx(bytes)?,
        FileType::Unsupported(hint) => {
            warn!(hint = %hint, "Unsupported file type");
            return Ok(Extraction::Unsupported(hint.clone()));
        }
    };

    Ok(Extraction::Text(text))
}

/// Render a table as a `TABLE:` block, one row per line.
pub(crate) fn render_table(rows: &[Vec<String>], cell_delimiter: &str) -> String {
    let body: Vec<String> = rows.iter().map(|row| row.join(cell_delimiter)).collect();
    format!("{}\n{}", TABLE_MARKER, body.join("\n"))
}
