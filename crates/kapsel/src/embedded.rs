#![forbid(unsafe_code)]

//! The build-time bundled update.
//!
//! An embedded directory holds `manifest.json` plus one file per declared
//! asset, named by the asset's key. It never goes through the store; it is
//! loaded straight from disk as the launcher's fallback of last resort.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::Utc;
use kapsel_core::{Manifest, Update, UpdateStatus};
use thiserror::Error;

/// Manifest file name inside an embedded update directory.
const EMBEDDED_MANIFEST: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum EmbeddedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Manifest(#[from] kapsel_core::CoreError),

    #[error("embedded launch asset missing: {0}")]
    MissingLaunchAsset(PathBuf),
}

/// A loaded embedded update, ready to hand to the host.
#[derive(Clone, Debug)]
pub struct EmbeddedUpdate {
    pub update: Update,
    pub launch_asset_path: PathBuf,
    /// Logical asset key → absolute path inside the embedded directory.
    pub asset_map: BTreeMap<String, PathBuf>,
}

impl EmbeddedUpdate {
    /// Load and validate the embedded update under `dir`.
    pub async fn load(dir: &Path) -> Result<Self, EmbeddedError> {
        let manifest_bytes = tokio::fs::read(dir.join(EMBEDDED_MANIFEST)).await?;
        let manifest = Manifest::parse(&manifest_bytes)?;

        let mut update = manifest.to_update(Utc::now());
        // Embedded bundles ship complete; they are launchable by definition.
        update.status = UpdateStatus::Ready;

        let mut asset_map = BTreeMap::new();
        let mut launch_asset_path = None;
        for pending in manifest.pending_assets() {
            let path = dir.join(&pending.key);
            if pending.is_launch_asset {
                if !tokio::fs::try_exists(&path).await? {
                    return Err(EmbeddedError::MissingLaunchAsset(path));
                }
                launch_asset_path = Some(path.clone());
            }
            asset_map.insert(pending.key, path);
        }

        let launch_asset_path = launch_asset_path
            .ok_or_else(|| EmbeddedError::MissingLaunchAsset(dir.join(EMBEDDED_MANIFEST)))?;

        Ok(Self {
            update,
            launch_asset_path,
            asset_map,
        })
    }
}
