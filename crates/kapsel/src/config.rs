#![forbid(unsafe_code)]

//! Client configuration.

use std::path::PathBuf;

use kapsel_net::{Headers, NetOptions, RetryPolicy};
use kapsel_policy::ReaperOptions;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("update URL must be http(s), got {0}")]
    UnsupportedScheme(String),

    #[error("runtime version must not be empty")]
    EmptyRuntimeVersion,

    #[error("asset concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Immutable settings for one update client instance.
///
/// Built once, validated once, then passed by reference to every component —
/// there are no process-wide globals, so tests can run any number of isolated
/// clients side by side.
#[derive(Clone, Debug)]
pub struct UpdatesConfig {
    /// Manifest endpoint of the update server.
    pub update_url: Url,
    /// Native binary version this client is compatible with; sent with every
    /// manifest request and recorded on stored updates.
    pub runtime_version: String,
    /// Scope under which server-defined filters persist. Defaults to the
    /// update URL, which is the right value unless several logical apps
    /// share one store.
    pub scope_key: String,
    /// Extra headers sent with every request (auth tokens and the like).
    pub request_headers: Headers,
    /// Root directory for the database and the asset files.
    pub storage_dir: PathBuf,
    /// Directory holding the build-time bundled update (`manifest.json` plus
    /// asset files named by key). The fallback of last resort.
    pub embedded_dir: Option<PathBuf>,
    pub net: NetOptions,
    pub retry: RetryPolicy,
    /// Simultaneous asset downloads per update load.
    pub asset_concurrency: usize,
    pub reaper: ReaperOptions,
}

impl UpdatesConfig {
    pub fn new(
        update_url: Url,
        runtime_version: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        let scope_key = update_url.as_str().to_owned();
        Self {
            update_url,
            runtime_version: runtime_version.into(),
            scope_key,
            request_headers: Headers::new(),
            storage_dir: storage_dir.into(),
            embedded_dir: None,
            net: NetOptions::default(),
            retry: RetryPolicy::default(),
            asset_concurrency: 4,
            reaper: ReaperOptions::default(),
        }
    }

    pub fn with_scope_key(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = scope_key.into();
        self
    }

    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_embedded_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.embedded_dir = Some(dir.into());
        self
    }

    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_asset_concurrency(mut self, concurrency: usize) -> Self {
        self.asset_concurrency = concurrency;
        self
    }

    pub fn with_reaper_options(mut self, reaper: ReaperOptions) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.update_url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        }
        if self.runtime_version.trim().is_empty() {
            return Err(ConfigError::EmptyRuntimeVersion);
        }
        if self.asset_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}
