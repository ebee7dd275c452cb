#![forbid(unsafe_code)]

//! Update selection and activation.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use chrono::Utc;
use kapsel_core::{ManifestFilters, Update, UpdateStatus};
use kapsel_policy::SelectionPolicySet;
use kapsel_store::UpdateStore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::UpdatesConfig, embedded::EmbeddedUpdate, error::LaunchError};

/// A ready-to-run bundle handle for the hosting runtime.
#[derive(Clone, Debug)]
pub struct LaunchedUpdate {
    pub update: Update,
    /// Absolute path of the entry-point asset.
    pub launch_asset_path: PathBuf,
    /// Logical asset key → absolute path, for host-side asset resolution.
    pub asset_map: BTreeMap<String, PathBuf>,
    /// True when this is the build-time bundled fallback rather than a
    /// stored update.
    pub is_embedded: bool,
}

/// Picks the update to run and assembles its launch handle.
pub struct Launcher {
    store: UpdateStore,
    config: Arc<UpdatesConfig>,
}

impl Launcher {
    pub fn new(store: UpdateStore, config: Arc<UpdatesConfig>) -> Self {
        Self { store, config }
    }

    /// Select and activate an update.
    ///
    /// Queries the store's launchable candidates, delegates the choice to the
    /// launcher policy, and verifies the launch asset actually exists on disk
    /// before handing it out. A candidate with a missing file is marked
    /// `Failed` and selection retries without it; when no stored candidate
    /// survives, the embedded update is the answer. This path only fails if
    /// even the embedded update is absent, which is a packaging error.
    pub async fn launch(
        &self,
        policies: &SelectionPolicySet,
        filters: Option<&ManifestFilters>,
    ) -> Result<LaunchedUpdate, LaunchError> {
        let mut excluded: Vec<Uuid> = Vec::new();

        loop {
            let candidates: Vec<Update> = self
                .store
                .launchable_updates(filters)
                .await?
                .into_iter()
                .filter(|u| !excluded.contains(&u.id))
                .collect();

            let Some(update) = policies.launcher.launchable_update(&candidates, filters) else {
                break;
            };

            match self.activate(&update).await? {
                Some(launched) => return Ok(launched),
                None => {
                    warn!(update = %update.id, "launch asset missing on disk, excluding");
                    self.store
                        .update_status(update.id, UpdateStatus::Failed)
                        .await?;
                    self.store.increment_failed_launch_count(update.id).await?;
                    excluded.push(update.id);
                }
            }
        }

        match &self.config.embedded_dir {
            Some(dir) => {
                debug!("falling back to embedded update");
                let embedded = EmbeddedUpdate::load(dir).await?;
                Ok(LaunchedUpdate {
                    update: embedded.update,
                    launch_asset_path: embedded.launch_asset_path,
                    asset_map: embedded.asset_map,
                    is_embedded: true,
                })
            }
            None => Err(LaunchError::NoLaunchableUpdate),
        }
    }

    /// Resolve paths for `update` and verify the launch asset is on disk.
    /// `None` means the launch asset (row or file) is missing.
    async fn activate(&self, update: &Update) -> Result<Option<LaunchedUpdate>, LaunchError> {
        let assets = self.store.assets_for_update(update.id).await?;

        let Some(launch_asset) = assets.iter().find(|a| a.is_launch_asset) else {
            return Ok(None);
        };
        let launch_asset_path = self.store.absolute_path_for(launch_asset);
        if !tokio::fs::try_exists(&launch_asset_path)
            .await
            .unwrap_or(false)
        {
            return Ok(None);
        }

        let mut asset_map = BTreeMap::new();
        for asset in &assets {
            if let Some(key) = &asset.key {
                asset_map.insert(key.clone(), self.store.absolute_path_for(asset));
            }
        }

        self.store
            .increment_successful_launch_count(update.id)
            .await?;
        self.store.mark_update_accessed(update.id, Utc::now()).await?;
        debug!(update = %update.id, "update activated");

        Ok(Some(LaunchedUpdate {
            update: update.clone(),
            launch_asset_path,
            asset_map,
            is_embedded: false,
        }))
    }
}
