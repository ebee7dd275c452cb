#![forbid(unsafe_code)]

use kapsel_net::DownloadError;
use kapsel_store::StoreError;
use thiserror::Error;

use crate::{config::ConfigError, embedded::EmbeddedError};

/// Launch activation errors.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No stored update is launchable and no embedded update exists. This is
    /// a packaging error: a correctly built host always ships an embedded
    /// bundle.
    #[error("no launchable update and no embedded fallback")]
    NoLaunchableUpdate,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("embedded update unusable: {0}")]
    Embedded(#[from] EmbeddedError),
}

/// Facade error: everything [`UpdateClient`](crate::UpdateClient) can fail
/// with, typed so hosts can decide between retry, fallback and giving up.
#[derive(Debug, Error)]
pub enum UpdatesError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

pub type UpdatesResult<T> = Result<T, UpdatesError>;
