#![forbid(unsafe_code)]

//! Manifest wire format.
//!
//! A manifest is the JSON document an update server returns: the update's
//! identity plus the list of assets that make up the bundle. Fields this
//! crate does not recognize are kept verbatim as metadata so servers can ship
//! rollout tags without a client release.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::{
    asset::Asset,
    error::{CoreError, CoreResult},
    metadata::MetadataMap,
    update::{Update, UpdateStatus},
};

/// One asset entry as declared by the manifest.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAsset {
    pub url: Url,
    pub key: String,
    #[serde(default)]
    pub content_type: String,
    /// Hex SHA-256 the server expects the bytes to hash to.
    #[serde(default)]
    pub hash: Option<String>,
}

/// Parsed update manifest.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(alias = "binaryVersions")]
    pub runtime_version: String,
    pub launch_asset: ManifestAsset,
    #[serde(default)]
    pub assets: Vec<ManifestAsset>,
    #[serde(default)]
    pub metadata: MetadataMap,
    /// Unrecognized top-level fields, stored verbatim.
    #[serde(flatten)]
    pub extra: MetadataMap,
}

impl Manifest {
    pub fn parse(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::InvalidManifest(e.to_string()))
    }

    /// Declared metadata merged with unrecognized fields.
    ///
    /// Explicit `metadata` entries win over colliding top-level extras.
    #[must_use]
    pub fn combined_metadata(&self) -> MetadataMap {
        let mut merged = self.extra.clone();
        merged.extend(self.metadata.clone());
        merged
    }

    /// The update row this manifest describes, in `Pending` state.
    #[must_use]
    pub fn to_update(&self, now: DateTime<Utc>) -> Update {
        Update {
            id: self.id,
            commit_time: self.created_at,
            runtime_version: self.runtime_version.clone(),
            metadata: self.combined_metadata(),
            status: UpdateStatus::Pending,
            manifest_filters: None,
            last_accessed: now,
            successful_launch_count: 0,
            failed_launch_count: 0,
        }
    }

    /// All declared assets, launch asset first.
    #[must_use]
    pub fn pending_assets(&self) -> Vec<PendingAsset> {
        let mut out = Vec::with_capacity(self.assets.len() + 1);
        out.push(PendingAsset::new(&self.launch_asset, true));
        out.extend(
            self.assets
                .iter()
                .filter(|a| a.key != self.launch_asset.key)
                .map(|a| PendingAsset::new(a, false)),
        );
        out
    }
}

/// An asset the manifest declared but whose bytes are not on disk yet.
///
/// The content hash (the dedup key) only exists once the bytes do, so the
/// loader works with `PendingAsset` until download and converts with
/// [`PendingAsset::into_asset`].
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAsset {
    pub url: Url,
    pub key: String,
    pub asset_type: String,
    pub expected_hash: Option<String>,
    pub is_launch_asset: bool,
}

impl PendingAsset {
    fn new(decl: &ManifestAsset, is_launch_asset: bool) -> Self {
        Self {
            url: decl.url.clone(),
            key: decl.key.clone(),
            asset_type: decl.content_type.clone(),
            expected_hash: decl.hash.clone(),
            is_launch_asset,
        }
    }

    /// True when `content_hash` satisfies the declared digest (or none was
    /// declared). Hex comparison is case-insensitive.
    #[must_use]
    pub fn hash_matches(&self, content_hash: &str) -> bool {
        self.expected_hash
            .as_deref()
            .is_none_or(|expected| expected.eq_ignore_ascii_case(content_hash))
    }

    /// Build the persistent record from downloaded bytes.
    #[must_use]
    pub fn into_asset(self, bytes: &[u8], download_time: DateTime<Utc>) -> Asset {
        let mut asset = Asset::from_bytes(
            bytes,
            Some(self.key),
            Some(self.url),
            self.asset_type,
            download_time,
        );
        asset.expected_hash = self.expected_hash;
        asset.is_launch_asset = self.is_launch_asset;
        asset
    }
}
