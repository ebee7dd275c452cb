#![forbid(unsafe_code)]

//! Core data model for the kapsel update client.
//!
//! An **update** is one immutable, versioned application bundle described by a
//! **manifest**; it references one or more content-addressed **assets**. This
//! crate defines those types plus the recency ordering shared by every
//! selection policy. Persistence lives in `kapsel-store`, transport in
//! `kapsel-net`.

mod asset;
mod error;
mod manifest;
mod metadata;
mod update;

pub use crate::{
    asset::{Asset, HashType, hash_bytes, relative_path_for},
    error::{CoreError, CoreResult},
    manifest::{Manifest, ManifestAsset, PendingAsset},
    metadata::{ManifestFilters, MetadataMap, MetadataValue},
    update::{Update, UpdateStatus, compare_recency},
};
