#![forbid(unsafe_code)]

use kapsel_core::{ManifestFilters, Update, UpdateStatus, compare_recency};
use uuid::Uuid;

use crate::traits::ReaperSelectionPolicy;

/// Retention configuration for [`RollbackBufferReaperPolicy`].
#[derive(Clone, Copy, Debug)]
pub struct ReaperOptions {
    /// How many `Ready` updates besides the launched one to keep as rollback
    /// generations.
    pub rollback_depth: usize,
}

impl Default for ReaperOptions {
    fn default() -> Self {
        Self { rollback_depth: 1 }
    }
}

/// Default deletion policy: retain the launched update plus the
/// `rollback_depth` most recent other `Ready` updates; mark everything else.
///
/// The launched update is retained unconditionally — recency does not matter
/// — which is also what keeps the reaper from ever racing the launcher over
/// a file in use.
#[derive(Clone, Copy, Debug, Default)]
pub struct RollbackBufferReaperPolicy {
    options: ReaperOptions,
}

impl RollbackBufferReaperPolicy {
    #[must_use]
    pub fn new(options: ReaperOptions) -> Self {
        Self { options }
    }
}

impl ReaperSelectionPolicy for RollbackBufferReaperPolicy {
    fn updates_to_delete(
        &self,
        launched_update: &Update,
        all_updates: &[Update],
        filters: Option<&ManifestFilters>,
    ) -> Vec<Uuid> {
        let mut rollback: Vec<&Update> = all_updates
            .iter()
            .filter(|u| u.id != launched_update.id)
            .filter(|u| u.status == UpdateStatus::Ready && u.matches_filters(filters))
            .collect();
        rollback.sort_by(|a, b| compare_recency(b, a));
        rollback.truncate(self.options.rollback_depth);

        all_updates
            .iter()
            .filter(|u| u.id != launched_update.id)
            .filter(|u| !rollback.iter().any(|kept| kept.id == u.id))
            .map(|u| u.id)
            .collect()
    }
}
