//! Error types shared across docrag crates.

use thiserror::Error;

/// Unified error type for configuration and shared serialization.
#[derive(Debug, Error)]
pub enum DocragError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
