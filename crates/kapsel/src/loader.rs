#![forbid(unsafe_code)]

//! Remote update orchestration: manifest checks and asset loading.

use std::sync::Arc;

use chrono::Utc;
use kapsel_core::{Asset, ManifestFilters, PendingAsset, Update, UpdateStatus, hash_bytes};
use kapsel_net::{DownloadError, Downloader, Headers, HttpClient, RetryNet};
use kapsel_policy::SelectionPolicySet;
use kapsel_store::UpdateStore;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::UpdatesConfig,
    error::{UpdatesError, UpdatesResult},
};

/// Outcome of a manifest check.
#[derive(Clone, Debug)]
pub enum CheckResult {
    /// Nothing new worth downloading.
    UpToDate,
    /// The server has an update this client should load.
    UpdateAvailable {
        update: Update,
        assets: Vec<PendingAsset>,
    },
}

/// Downloads manifests and assets, persisting them through the store.
///
/// Transient transport failures are retried here (via the retry decorator
/// composed around the client), bounded by the configured policy. Permanent
/// failures mark the update `Failed`; a corrected bundle always arrives under
/// a new update id, so a failed id is never retried.
pub struct RemoteLoader {
    config: Arc<UpdatesConfig>,
    store: UpdateStore,
    downloader: Arc<Downloader<RetryNet<HttpClient>>>,
    cancel: CancellationToken,
}

impl RemoteLoader {
    pub fn new(config: Arc<UpdatesConfig>, store: UpdateStore, cancel: CancellationToken) -> Self {
        let net = RetryNet::new(HttpClient::new(config.net.clone()), config.retry.clone());
        let downloader = Arc::new(Downloader::new(net, cancel.clone()));
        Self {
            config,
            store,
            downloader,
            cancel,
        }
    }

    /// Headers for a manifest request: protocol headers first, then the
    /// configured extras (which may override).
    fn manifest_headers(&self, launched: Option<&Update>) -> Headers {
        let mut headers = Headers::new();
        headers.insert("accept", "application/json");
        headers.insert("x-runtime-version", self.config.runtime_version.as_str());
        headers.insert("x-scope-key", self.config.scope_key.as_str());
        if let Some(launched) = launched {
            headers.insert("x-current-update-id", launched.id.to_string());
        }
        for (k, v) in self.config.request_headers.iter() {
            headers.insert(k, v);
        }
        headers
    }

    /// Fetch the manifest and decide whether it is worth loading.
    ///
    /// Persists server-defined manifest filters as a side effect, so later
    /// launches see the server's current scoping even before any download.
    pub async fn check_for_update(
        &self,
        policies: &SelectionPolicySet,
        launched: Option<&Update>,
        filters: Option<&ManifestFilters>,
    ) -> UpdatesResult<CheckResult> {
        let resp = self
            .downloader
            .download_manifest(
                self.config.update_url.clone(),
                Some(self.manifest_headers(launched)),
            )
            .await?;

        if let Some(server_filters) = &resp.filters {
            self.store
                .set_manifest_filters(&self.config.scope_key, server_filters)
                .await?;
        }

        // An id we already finished with — loaded or permanently failed — is
        // never worth another download.
        if let Some(existing) = self.store.update_by_id(resp.update.id).await? {
            if matches!(
                existing.status,
                UpdateStatus::Ready | UpdateStatus::Failed | UpdateStatus::Unused
            ) {
                debug!(update = %existing.id, status = ?existing.status, "manifest already known");
                return Ok(CheckResult::UpToDate);
            }
        }

        if !policies
            .loader
            .should_load_new_update(&resp.update, launched, filters)
        {
            return Ok(CheckResult::UpToDate);
        }

        Ok(CheckResult::UpdateAvailable {
            update: resp.update,
            assets: resp.assets,
        })
    }

    /// Download, verify and persist every asset of `update`, then flip it to
    /// `Ready`.
    ///
    /// Asset downloads run concurrently, bounded by the configured
    /// concurrency. Assets whose declared hash already exists in the store
    /// are linked without touching the network. Any permanent failure marks
    /// the update `Failed` and propagates; cancellation leaves the update
    /// `Pending` (and resumable) with no partial files at final paths.
    pub async fn load_update(
        &self,
        update: Update,
        assets: Vec<PendingAsset>,
    ) -> UpdatesResult<Update> {
        if self.store.update_by_id(update.id).await?.is_none() {
            self.store.add_update(&update).await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.asset_concurrency));
        let mut tasks = tokio::task::JoinSet::new();
        for pending in assets {
            let semaphore = Arc::clone(&semaphore);
            let loader_store = self.store.clone();
            let downloader = Arc::clone(&self.downloader);
            let update_id = update.id;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| UpdatesError::Download(DownloadError::Cancelled))?;
                load_one_asset(&loader_store, &downloader, update_id, pending).await
            });
        }

        let mut failure: Option<UpdatesError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                // Tasks aborted after the first failure; nothing to record.
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(UpdatesError::Download(DownloadError::Io(
                    std::io::Error::other(e),
                ))),
            };
            if let Err(err) = result {
                warn!(update = %update.id, error = %err, "asset load failed");
                failure.get_or_insert(err);
                tasks.abort_all();
            }
        }

        if let Some(err) = failure {
            let permanent = match &err {
                UpdatesError::Download(d) => {
                    !d.is_transient() && !matches!(d, DownloadError::Cancelled)
                }
                _ => false,
            };
            if permanent {
                self.store
                    .update_status(update.id, UpdateStatus::Failed)
                    .await?;
            }
            return Err(err);
        }

        self.store
            .update_status(update.id, UpdateStatus::Ready)
            .await?;
        debug!(update = %update.id, "update loaded and ready");

        self.store
            .update_by_id(update.id)
            .await?
            .ok_or(UpdatesError::Store(kapsel_store::StoreError::UpdateNotFound(
                update.id,
            )))
    }

    /// Token that aborts in-flight downloads when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Fetch (or reuse) one asset and persist it for `update_id`.
async fn load_one_asset(
    store: &UpdateStore,
    downloader: &Downloader<RetryNet<HttpClient>>,
    update_id: uuid::Uuid,
    pending: PendingAsset,
) -> UpdatesResult<Asset> {
    // Dedup probe: identical declared content may already be on disk from an
    // earlier update. Link it instead of downloading.
    if let Some(expected) = &pending.expected_hash {
        let expected = expected.to_ascii_lowercase();
        if let Some(mut existing) = store.asset_with_content_hash(&expected).await? {
            existing.is_launch_asset = pending.is_launch_asset;
            let stored = store.add_asset(&existing, update_id).await?;
            debug!(key = %pending.key, "asset reused from store");
            return Ok(stored);
        }
    }

    let bytes = downloader
        .download_asset(pending.url.clone(), None)
        .await?;

    let content_hash = hash_bytes(&bytes);
    if !pending.hash_matches(&content_hash) {
        let expected = pending.expected_hash.clone().unwrap_or_default();
        return Err(UpdatesError::Download(DownloadError::ChecksumMismatch {
            expected,
            actual: content_hash,
        }));
    }

    let asset = pending.into_asset(&bytes, Utc::now());
    write_asset_file(store, &asset, &bytes).await?;
    let stored = store.add_asset(&asset, update_id).await?;
    Ok(stored)
}

/// Write asset bytes to their content-addressed path, atomically.
///
/// Write-temp-then-rename in the destination directory: concurrent writers
/// of the same content race benignly (same bytes, last rename wins) and a
/// crash never leaves a partial file at the final path.
async fn write_asset_file(
    store: &UpdateStore,
    asset: &Asset,
    bytes: &[u8],
) -> Result<(), DownloadError> {
    let dest = store.absolute_path_for(asset);
    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        return Ok(());
    }

    let parent = dest
        .parent()
        .ok_or_else(|| DownloadError::Io(std::io::Error::other("asset path has no parent")))?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent).await?;

    let bytes = bytes.to_vec();
    let dest_clone = dest.clone();
    tokio::task::spawn_blocking(move || -> Result<(), DownloadError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        std::io::Write::write_all(&mut tmp, &bytes)?;
        tmp.persist(&dest_clone)
            .map_err(|e| DownloadError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| DownloadError::Io(std::io::Error::other(e)))?
}
