#![forbid(unsafe_code)]

use kapsel_core::{ManifestFilters, Update};
use uuid::Uuid;

/// Picks the single update to run from the store's launchable candidates.
pub trait LauncherSelectionPolicy: Send + Sync {
    /// `None` means no stored candidate is acceptable and the caller must
    /// fall back to the embedded update.
    fn launchable_update(
        &self,
        candidates: &[Update],
        filters: Option<&ManifestFilters>,
    ) -> Option<Update>;
}

/// Decides whether a freshly fetched manifest is worth downloading relative
/// to what is currently launched.
pub trait LoaderSelectionPolicy: Send + Sync {
    fn should_load_new_update(
        &self,
        new_update: &Update,
        launched_update: Option<&Update>,
        filters: Option<&ManifestFilters>,
    ) -> bool;
}

/// Chooses which stored updates the reaper may delete.
pub trait ReaperSelectionPolicy: Send + Sync {
    /// Ids to mark for deletion. Must never include `launched_update`.
    fn updates_to_delete(
        &self,
        launched_update: &Update,
        all_updates: &[Update],
        filters: Option<&ManifestFilters>,
    ) -> Vec<Uuid>;
}
