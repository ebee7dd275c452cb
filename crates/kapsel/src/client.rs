#![forbid(unsafe_code)]

//! Host facade.

use std::sync::Arc;

use kapsel_core::ManifestFilters;
use kapsel_policy::SelectionPolicySet;
use kapsel_store::UpdateStore;
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::{
    config::UpdatesConfig,
    embedded::EmbeddedUpdate,
    error::UpdatesResult,
    events::{EventBus, UpdateEvent},
    launcher::{LaunchedUpdate, Launcher},
    loader::{CheckResult, RemoteLoader},
    reaper::Reaper,
};

/// The update subsystem as the hosting runtime sees it.
///
/// This is the only surface the host layer is supposed to call: activate with
/// [`start`](UpdateClient::start), read the active bundle with
/// [`launched_update`](UpdateClient::launched_update), poll the server with
/// [`check_for_update`](UpdateClient::check_for_update) /
/// [`fetch_update`](UpdateClient::fetch_update), and swap to a newer bundle
/// with [`request_relaunch`](UpdateClient::request_relaunch).
///
/// Launch and sweep are internally serialized against the same store, so the
/// reaper can never unlink a file the launcher is about to read.
pub struct UpdateClient {
    config: Arc<UpdatesConfig>,
    store: UpdateStore,
    policies: SelectionPolicySet,
    launcher: Launcher,
    loader: RemoteLoader,
    reaper: Reaper,
    launched: RwLock<Option<LaunchedUpdate>>,
    events: EventBus,
    cancel: CancellationToken,
}

impl UpdateClient {
    /// Validate `config`, open the store, and wire the components together.
    /// No network traffic and no launch happen here.
    pub async fn new(config: UpdatesConfig) -> UpdatesResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let store = UpdateStore::open(&config.storage_dir).await?;
        let cancel = CancellationToken::new();

        Ok(Self {
            launcher: Launcher::new(store.clone(), Arc::clone(&config)),
            loader: RemoteLoader::new(Arc::clone(&config), store.clone(), cancel.clone()),
            reaper: Reaper::new(store.clone()),
            policies: SelectionPolicySet::with_reaper_options(config.reaper),
            launched: RwLock::new(None),
            events: EventBus::default(),
            cancel,
            store,
            config,
        })
    }

    /// Replace the default selection policies.
    #[must_use]
    pub fn with_policies(mut self, policies: SelectionPolicySet) -> Self {
        self.policies = policies;
        self
    }

    /// Launch the best stored update (or the embedded fallback), then sweep.
    ///
    /// The sweep runs after the launch completes, never concurrently with
    /// it; a sweep failure is logged and swallowed — it only delays cleanup
    /// and the next start finishes the job.
    pub async fn start(&self) -> UpdatesResult<LaunchedUpdate> {
        let filters = self.scoped_filters().await?;
        let launched = self.launcher.launch(&self.policies, filters.as_ref()).await?;

        *self.launched.write().await = Some(launched.clone());
        self.events.emit(UpdateEvent::Launched {
            update_id: launched.update.id,
            is_embedded: launched.is_embedded,
        });

        if let Err(e) = self
            .reaper
            .sweep(&self.policies, &launched, filters.as_ref())
            .await
        {
            warn!(error = %e, "post-launch sweep failed");
        }

        Ok(launched)
    }

    /// The currently active bundle, if [`start`](UpdateClient::start) has run.
    pub async fn launched_update(&self) -> Option<LaunchedUpdate> {
        self.launched.read().await.clone()
    }

    /// The build-time bundled update, independent of the store.
    pub async fn embedded_update(&self) -> Option<EmbeddedUpdate> {
        match &self.config.embedded_dir {
            Some(dir) => match EmbeddedUpdate::load(dir).await {
                Ok(embedded) => Some(embedded),
                Err(e) => {
                    warn!(error = %e, "embedded update unusable");
                    None
                }
            },
            None => None,
        }
    }

    /// Ask the server whether a new update exists, without downloading it.
    pub async fn check_for_update(&self) -> UpdatesResult<CheckResult> {
        self.events.emit(UpdateEvent::CheckStarted);
        let filters = self.scoped_filters().await?;
        let launched = self.launched.read().await.clone();
        let launched_update = launched.as_ref().map(|l| &l.update);

        let result = self
            .loader
            .check_for_update(&self.policies, launched_update, filters.as_ref())
            .await?;

        match &result {
            CheckResult::UpToDate => self.events.emit(UpdateEvent::NoUpdateAvailable),
            CheckResult::UpdateAvailable { update, .. } => {
                self.events.emit(UpdateEvent::UpdateAvailable {
                    update_id: update.id,
                });
            }
        }
        Ok(result)
    }

    /// Check, and when an update is available, download and persist it.
    ///
    /// Returns the id of the newly `Ready` update, or `None` when up to
    /// date. The new update takes effect on the next
    /// [`request_relaunch`](UpdateClient::request_relaunch) or process start.
    pub async fn fetch_update(&self) -> UpdatesResult<Option<Uuid>> {
        let CheckResult::UpdateAvailable { update, assets } = self.check_for_update().await?
        else {
            return Ok(None);
        };

        let update_id = update.id;
        match self.loader.load_update(update, assets).await {
            Ok(loaded) => {
                self.events.emit(UpdateEvent::UpdateLoaded {
                    update_id: loaded.id,
                });
                Ok(Some(loaded.id))
            }
            Err(e) => {
                self.events.emit(UpdateEvent::LoadFailed {
                    update_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Re-run selection and swap the active bundle, returning the new handle.
    /// The host is responsible for actually restarting its runtime on top of
    /// the returned paths.
    pub async fn request_relaunch(&self) -> UpdatesResult<LaunchedUpdate> {
        let filters = self.scoped_filters().await?;
        let launched = self.launcher.launch(&self.policies, filters.as_ref()).await?;

        *self.launched.write().await = Some(launched.clone());
        self.events.emit(UpdateEvent::Launched {
            update_id: launched.update.id,
            is_embedded: launched.is_embedded,
        });
        Ok(launched)
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    /// Abort in-flight downloads and refuse new ones. Cancelled loads stay
    /// `Pending` with no partial files, so a future client instance resumes
    /// them cleanly.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn scoped_filters(&self) -> UpdatesResult<Option<ManifestFilters>> {
        Ok(self.store.manifest_filters(&self.config.scope_key).await?)
    }
}
