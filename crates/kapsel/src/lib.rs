#![forbid(unsafe_code)]

//! Over-the-air update client.
//!
//! kapsel downloads versioned application bundles (a manifest plus
//! content-addressed assets), persists them, picks which one to launch via
//! pluggable selection policies, and garbage-collects superseded bundles.
//! Hosts talk to one type:
//!
//! ```ignore
//! use kapsel::{UpdateClient, UpdatesConfig};
//!
//! let config = UpdatesConfig::new(
//!     "https://updates.example.com/manifest".parse()?,
//!     "2.0.0",
//!     "/var/lib/myapp/updates",
//! );
//! let client = UpdateClient::new(config).await?;
//! let launched = client.start().await?;
//! run_bundle(&launched.launch_asset_path, &launched.asset_map);
//! ```
//!
//! The worst case a user ever sees is a silent fallback to the last known
//! good update, or to the embedded bundle shipped with the binary.

mod client;
mod config;
mod embedded;
mod error;
mod events;
mod launcher;
mod loader;
mod reaper;

pub use kapsel_core::{
    Asset, ManifestFilters, MetadataMap, MetadataValue, Update, UpdateStatus,
};
pub use kapsel_net::{DownloadError, Headers, NetOptions, RetryPolicy};
pub use kapsel_policy::{ReaperOptions, SelectionPolicySet};
pub use kapsel_store::{StoreError, UpdateStore};

pub use crate::{
    client::UpdateClient,
    config::{ConfigError, UpdatesConfig},
    embedded::{EmbeddedError, EmbeddedUpdate},
    error::{LaunchError, UpdatesError, UpdatesResult},
    events::{EventBus, UpdateEvent},
    launcher::{LaunchedUpdate, Launcher},
    loader::{CheckResult, RemoteLoader},
    reaper::{Reaper, SweepStats},
};
