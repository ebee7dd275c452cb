#![forbid(unsafe_code)]

//! Selection policies: which update to launch, whether to fetch a new one,
//! and which stored updates are eligible for deletion.
//!
//! The three concerns are independently substitutable strategies over the
//! shared data model, so deployments can customize rollout logic without
//! touching the store or the downloader. [`SelectionPolicySet`] bundles one
//! of each; [`SelectionPolicySet::default`] gives the stock behavior.
//!
//! All three defaults share one recency ordering
//! ([`kapsel_core::compare_recency`]): newer `commit_time` wins, and equal
//! commit times are broken by UUID string order. Reproducing that ordering
//! exactly is what makes launch selection, load decisions and reaping agree
//! with each other.

mod launcher;
mod loader;
mod reaper;
mod set;
mod traits;

pub use crate::{
    launcher::LatestLauncherPolicy,
    loader::NewerLoaderPolicy,
    reaper::{ReaperOptions, RollbackBufferReaperPolicy},
    set::SelectionPolicySet,
    traits::{LauncherSelectionPolicy, LoaderSelectionPolicy, ReaperSelectionPolicy},
};
