#![forbid(unsafe_code)]

//! Garbage collection of superseded updates and unreferenced assets.

use kapsel_core::ManifestFilters;
use kapsel_policy::SelectionPolicySet;
use kapsel_store::{StoreResult, UpdateStore};
use tracing::{debug, warn};

use crate::launcher::LaunchedUpdate;

/// What one sweep removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub updates_marked: usize,
    pub assets_deleted: usize,
}

/// Two-phase background cleanup.
///
/// Marking (rows flagged, updates flipped to `Unused`) and physical deletion
/// (files unlinked, rows dropped) are separate store operations, so a crash
/// at any point leaves either fully referenced state or marked leftovers that
/// the next sweep finishes. The sweep never touches the launched update or
/// anything it references: the retention policy excludes the launched update
/// by contract, and assets referenced by retained updates are unmarked
/// inside the store's own transaction.
pub struct Reaper {
    store: UpdateStore,
}

impl Reaper {
    pub fn new(store: UpdateStore) -> Self {
        Self { store }
    }

    /// Run one sweep against a consistent snapshot of the launched update.
    ///
    /// Must not run concurrently with a launch against the same store; the
    /// client serializes the two.
    pub async fn sweep(
        &self,
        policies: &SelectionPolicySet,
        launched: &LaunchedUpdate,
        filters: Option<&ManifestFilters>,
    ) -> StoreResult<SweepStats> {
        let all = self.store.all_updates().await?;
        let doomed = policies
            .reaper
            .updates_to_delete(&launched.update, &all, filters);

        self.store.mark_updates_for_deletion(&doomed).await?;
        let marked_assets = self.store.mark_assets_for_deletion().await?;

        // Unlink before dropping rows: a file with no row would leak forever,
        // a row with no file is finished by the next sweep.
        let mut asset_ids = Vec::with_capacity(marked_assets.len());
        for asset in &marked_assets {
            let path = self.store.absolute_path_for(asset);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "asset unlink failed, leaving row marked");
                    continue;
                }
            }
            if let Some(id) = asset.id {
                asset_ids.push(id);
            }
        }

        self.store.delete_assets_with_ids(&asset_ids).await?;
        self.store.delete_unused_updates().await?;

        let stats = SweepStats {
            updates_marked: doomed.len(),
            assets_deleted: asset_ids.len(),
        };
        debug!(?stats, "sweep finished");
        Ok(stats)
    }
}
