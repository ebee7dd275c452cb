#![forbid(unsafe_code)]

use thiserror::Error;

/// Core model errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("unknown update status code: {0}")]
    UnknownStatus(i64),
}

pub type CoreResult<T> = Result<T, CoreError>;
