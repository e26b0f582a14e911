use quorum_models::ExecutionStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decision record not found: id={0}")]
    NotFound(i64),

    #[error("Decision record {id} already finalized as {status}")]
    AlreadyFinalized { id: i64, status: ExecutionStatus },

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
