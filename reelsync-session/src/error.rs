//! Session-layer error types.

use thiserror::Error;

/// Errors surfaced by providers and the settings store.
///
/// The session manager itself never propagates these to callers; provider
/// failures become status transitions. They cross the boundary only on the
/// provider traits and the settings API.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] reelsync_store::StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
