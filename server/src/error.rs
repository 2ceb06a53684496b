//! Error types for stat persistence

use thiserror::Error;

/// Errors raised while reading or writing persisted stats
#[derive(Error, Debug)]
pub enum StatStoreError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The persistence worker has stopped and no longer accepts jobs
    #[error("persistence worker is not running")]
    WorkerUnavailable,
}
