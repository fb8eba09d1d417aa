//! File type hints derived from object keys.

use serde::{Deserialize, Serialize};

/// Type hint used to select an extractor and a chunking policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Csv,
    Xlsx,
    /// Anything else, carrying the lowercase hint that was seen
    Unsupported(String),
}

impl FileType {
    /// Parse a type hint such as `"pdf"` or `"XLSX"`.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "docx" => FileType::Docx,
            "txt" => FileType::Txt,
            "csv" => FileType::Csv,
            "xlsx" => FileType::Xlsx,
            other => FileType::Unsupported(other.to_string()),
        }
    }

    /// Detect the type from the suffix after the final `.` of an object key.
    ///
    /// A key without any `.` is unsupported.
    pub fn from_key(key: &str) -> Self {
        match key.rsplit_once('.') {
            Some((_, ext)) => Self::from_hint(ext),
            None => FileType::Unsupported(String::new()),
        }
    }

    /// Tabular types are chunked by row groups instead of paragraphs.
    pub fn is_tabular(&self) -> bool {
        matches!(self, FileType::Csv | FileType::Xlsx)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FileType::Unsupported(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Csv => "csv",
            FileType::Xlsx => "xlsx",
            FileType::Unsupported(hint) => hint,
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Unsupported(hint) => write!(f, "unsupported({})", hint),
            other => f.write_str(other.as_str()),
        }
    }
}
