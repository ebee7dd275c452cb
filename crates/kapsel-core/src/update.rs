#![forbid(unsafe_code)]

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{CoreError, CoreResult},
    metadata::{ManifestFilters, MetadataMap},
};

/// Lifecycle state of a stored update.
///
/// `Pending → Ready` once every asset is on disk with a verified hash;
/// `Pending → Failed` on permanent validation failure; `Ready → Failed` when
/// the launch asset goes missing at activation time. `Unused` is the marked
/// half of the reaper's two-phase delete and is terminal until the row is
/// physically dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateStatus {
    Pending,
    Ready,
    Failed,
    Unused,
}

impl UpdateStatus {
    /// Integer code persisted in SQLite.
    #[must_use]
    pub fn as_db(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Ready => 1,
            Self::Failed => 2,
            Self::Unused => 3,
        }
    }

    pub fn from_db(code: i64) -> CoreResult<Self> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Ready),
            2 => Ok(Self::Failed),
            3 => Ok(Self::Unused),
            other => Err(CoreError::UnknownStatus(other)),
        }
    }

    /// Whether the state machine allows `self → next`.
    ///
    /// Any state may move to `Unused` (reaper mark phase). Everything else is
    /// restricted to the transitions listed above.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Unused) => !matches!(self, Self::Unused),
            (Self::Pending, Self::Ready | Self::Failed) => true,
            (Self::Ready, Self::Failed) => true,
            _ => false,
        }
    }
}

/// One immutable, versioned application bundle.
///
/// Identity and manifest-derived fields never change after persistence; a new
/// remote manifest is always a new update row. Only `status`, the launch
/// counters and `last_accessed` are mutated, and only by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub id: Uuid,
    pub commit_time: DateTime<Utc>,
    pub runtime_version: String,
    pub metadata: MetadataMap,
    pub status: UpdateStatus,
    pub manifest_filters: Option<ManifestFilters>,
    pub last_accessed: DateTime<Utc>,
    pub successful_launch_count: u32,
    pub failed_launch_count: u32,
}

impl Update {
    /// An update that has only ever failed to launch is not a candidate.
    #[must_use]
    pub fn launch_history_allows_launch(&self) -> bool {
        self.successful_launch_count > 0 || self.failed_launch_count == 0
    }

    /// True when this update's metadata is compatible with `filters`.
    #[must_use]
    pub fn matches_filters(&self, filters: Option<&ManifestFilters>) -> bool {
        filters.is_none_or(|f| f.matches(&self.metadata))
    }
}

/// Recency ordering shared by every selection policy.
///
/// `Less` means `a` is older than `b`. Ties on `commit_time` are broken by
/// the UUID string: the lexicographically smaller id is treated as older.
/// This must stay byte-for-byte reproducible; launch selection, load
/// decisions and reaping all assume the same total order.
#[must_use]
pub fn compare_recency(a: &Update, b: &Update) -> Ordering {
    a.commit_time
        .cmp(&b.commit_time)
        .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
}
