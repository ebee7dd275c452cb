#![forbid(unsafe_code)]

use kapsel_core::{CoreError, UpdateStatus};
use thiserror::Error;
use uuid::Uuid;

/// Store errors. Every failing operation rolls its transaction back first.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("update {0} already exists")]
    DuplicateId(Uuid),

    #[error("update {0} not found")]
    UpdateNotFound(Uuid),

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: UpdateStatus,
        to: UpdateStatus,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
