#![forbid(unsafe_code)]

use std::cmp::Ordering;

use kapsel_core::{ManifestFilters, Update, compare_recency};

use crate::traits::LoaderSelectionPolicy;

/// Default load decision: fetch when nothing is launched or the new update is
/// strictly newer than the launched one.
///
/// This is what prevents re-downloading the update that is already active:
/// the server keeps serving the same manifest until it has something newer,
/// and an equal-or-older manifest is never worth the bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NewerLoaderPolicy;

impl LoaderSelectionPolicy for NewerLoaderPolicy {
    fn should_load_new_update(
        &self,
        new_update: &Update,
        launched_update: Option<&Update>,
        _filters: Option<&ManifestFilters>,
    ) -> bool {
        match launched_update {
            None => true,
            Some(launched) => compare_recency(new_update, launched) == Ordering::Greater,
        }
    }
}
