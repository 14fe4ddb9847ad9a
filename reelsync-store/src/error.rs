//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur on the store's merge surface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document engine rejected an encoded update or state vector.
    #[error("engine error: {0}")]
    Engine(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backup snapshot had an unexpected shape.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
