#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::{
    launcher::LatestLauncherPolicy,
    loader::NewerLoaderPolicy,
    reaper::{ReaperOptions, RollbackBufferReaperPolicy},
    traits::{LauncherSelectionPolicy, LoaderSelectionPolicy, ReaperSelectionPolicy},
};

/// One strategy of each kind, shared by the launcher, loader and reaper.
///
/// The set is cheap to clone and safe to share; custom deployments swap any
/// of the three without touching the others.
#[derive(Clone)]
pub struct SelectionPolicySet {
    pub launcher: Arc<dyn LauncherSelectionPolicy>,
    pub loader: Arc<dyn LoaderSelectionPolicy>,
    pub reaper: Arc<dyn ReaperSelectionPolicy>,
}

impl SelectionPolicySet {
    pub fn new(
        launcher: Arc<dyn LauncherSelectionPolicy>,
        loader: Arc<dyn LoaderSelectionPolicy>,
        reaper: Arc<dyn ReaperSelectionPolicy>,
    ) -> Self {
        Self {
            launcher,
            loader,
            reaper,
        }
    }

    /// Default set with a custom rollback depth.
    #[must_use]
    pub fn with_reaper_options(options: ReaperOptions) -> Self {
        Self {
            launcher: Arc::new(LatestLauncherPolicy),
            loader: Arc::new(NewerLoaderPolicy),
            reaper: Arc::new(RollbackBufferReaperPolicy::new(options)),
        }
    }
}

impl Default for SelectionPolicySet {
    fn default() -> Self {
        Self::with_reaper_options(ReaperOptions::default())
    }
}

impl std::fmt::Debug for SelectionPolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionPolicySet").finish_non_exhaustive()
    }
}
