use quorum_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("Order timed out after {0} seconds")]
    Timeout(u64),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
