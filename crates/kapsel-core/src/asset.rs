#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// Digest algorithm used for asset content hashes.
///
/// Only SHA-256 today; the column exists so a future algorithm change does
/// not need a schema migration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashType {
    #[default]
    Sha256,
}

impl HashType {
    #[must_use]
    pub fn as_db(self) -> i64 {
        match self {
            Self::Sha256 => 0,
        }
    }

    /// Unknown codes fall back to SHA-256 rather than failing the read; the
    /// hash itself still has to match, so this cannot hide corruption.
    #[must_use]
    pub fn from_db(_code: i64) -> Self {
        Self::Sha256
    }
}

/// Hex-encoded SHA-256 of `bytes` — the content-addressing key.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// On-disk location for a content hash, relative to the asset root.
///
/// The asset directory is flat and keyed by content hash; two assets with the
/// same bytes share one file no matter how many updates reference them. The
/// extension is cosmetic (it helps hosts that sniff file types) and comes
/// from the manifest's asset type when that is a plain token.
#[must_use]
pub fn relative_path_for(content_hash: &str, asset_type: &str) -> String {
    let ext_ok = !asset_type.is_empty()
        && asset_type.len() <= 12
        && asset_type.chars().all(|c| c.is_ascii_alphanumeric());
    if ext_ok {
        format!("{content_hash}.{asset_type}")
    } else {
        content_hash.to_owned()
    }
}

/// One content-addressed file referenced by one or more updates.
///
/// `content_hash` is the deduplication key: the store guarantees at most one
/// asset row (and one on-disk file) per hash. `expected_hash` is the digest
/// the manifest declared before download, kept for re-validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    /// Store row id; `None` until persisted.
    pub id: Option<i64>,
    /// Logical name the manifest used for this asset.
    pub key: Option<String>,
    pub url: Option<Url>,
    pub headers: BTreeMap<String, String>,
    pub asset_type: String,
    pub expected_hash: Option<String>,
    pub content_hash: String,
    pub hash_type: HashType,
    pub relative_path: String,
    pub download_time: DateTime<Utc>,
    pub is_launch_asset: bool,
}

impl Asset {
    /// Build an asset record from downloaded bytes.
    pub fn from_bytes(
        bytes: &[u8],
        key: Option<String>,
        url: Option<Url>,
        asset_type: impl Into<String>,
        download_time: DateTime<Utc>,
    ) -> Self {
        let asset_type = asset_type.into();
        let content_hash = hash_bytes(bytes);
        let relative_path = relative_path_for(&content_hash, &asset_type);
        Self {
            id: None,
            key,
            url,
            headers: BTreeMap::new(),
            asset_type,
            expected_hash: None,
            content_hash,
            hash_type: HashType::Sha256,
            relative_path,
            download_time,
            is_launch_asset: false,
        }
    }
}
