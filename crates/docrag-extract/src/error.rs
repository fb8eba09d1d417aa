//! Extraction error types.

use thiserror::Error;

/// Errors that can occur while extracting text.
///
/// Unsupported file types are not errors; see [`crate::Extraction::Unsupported`].
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Malformed payload for the declared type
    #[error("Corrupt {file_type} payload: {reason}")]
    Corrupt { file_type: String, reason: String },

    /// Text payload is not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl ExtractError {
    pub fn corrupt(file_type: &str, reason: impl std::fmt::Display) -> Self {
        ExtractError::Corrupt {
            file_type: file_type.to_string(),
            reason: reason.to_string(),
        }
    }
}
