//! Store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional transaction assertion failed; nothing was written.
    /// Callers treat this as losing a race, not as a fault.
    #[error("transaction aborted: an assertion did not hold")]
    Aborted,

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
