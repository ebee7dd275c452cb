#![forbid(unsafe_code)]

//! In-process update server for integration tests.
//!
//! Serves a manifest at `/manifest` and registered asset payloads under
//! `/assets/{key}`. Failures can be scripted (the next N manifest requests
//! answer with a fixed status) to exercise retry paths.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use kapsel_core::hash_bytes;
use tokio::net::TcpListener;
use url::Url;
use uuid::Uuid;

#[derive(Clone, Default)]
struct ServerState {
    manifest: Arc<Mutex<Option<serde_json::Value>>>,
    manifest_filters: Arc<Mutex<Option<serde_json::Value>>>,
    assets: Arc<Mutex<HashMap<String, Bytes>>>,
    manifest_hits: Arc<AtomicU32>,
    scripted_failures: Arc<Mutex<Vec<u16>>>,
}

/// Lightweight update-server fixture bound to a random localhost port.
pub struct TestUpdateServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    state: ServerState,
}

impl TestUpdateServer {
    /// Spawn the server.
    ///
    /// # Panics
    ///
    /// Panics if listener bind or URL parsing fails.
    pub async fn start() -> Self {
        let state = ServerState::default();
        let router = Router::new()
            .route("/manifest", get(manifest_handler))
            .route("/assets/{key}", get(asset_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test update server listener");
        let addr = listener
            .local_addr()
            .expect("read test listener local addr");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });

        tokio::spawn(async move {
            server.await.expect("run test update server");
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("parse base URL"),
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    /// Join `path` to the server base URL.
    ///
    /// # Panics
    ///
    /// Panics if URL join fails.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("join server URL path")
    }

    #[must_use]
    pub fn manifest_url(&self) -> Url {
        self.url("/manifest")
    }

    /// Install the manifest served at `/manifest`.
    pub fn set_manifest(&self, manifest: serde_json::Value) {
        *self.state.manifest.lock().expect("manifest lock") = Some(manifest);
    }

    /// Attach an `x-manifest-filters` header to manifest responses.
    pub fn set_manifest_filters(&self, filters: serde_json::Value) {
        *self.state.manifest_filters.lock().expect("filters lock") = Some(filters);
    }

    /// Register asset bytes under `/assets/{key}` and return their URL plus
    /// hex content hash.
    pub fn add_asset(&self, key: &str, bytes: impl Into<Bytes>) -> (Url, String) {
        let bytes = bytes.into();
        let hash = hash_bytes(&bytes);
        self.state
            .assets
            .lock()
            .expect("assets lock")
            .insert(key.to_owned(), bytes);
        (self.url(&format!("/assets/{key}")), hash)
    }

    /// The next `n` manifest requests answer with `status` before normal
    /// serving resumes.
    pub fn fail_next_manifest_requests(&self, n: u32, status: u16) {
        let mut scripted = self
            .state
            .scripted_failures
            .lock()
            .expect("failures lock");
        for _ in 0..n {
            scripted.push(status);
        }
    }

    /// How many times `/manifest` has been hit.
    #[must_use]
    pub fn manifest_requests(&self) -> u32 {
        self.state.manifest_hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestUpdateServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

async fn manifest_handler(State(state): State<ServerState>) -> Response {
    state.manifest_hits.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = state
        .scripted_failures
        .lock()
        .expect("failures lock")
        .pop()
    {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    let manifest = state.manifest.lock().expect("manifest lock").clone();
    let filters = state.manifest_filters.lock().expect("filters lock").clone();
    match manifest {
        Some(value) => {
            let mut resp = (
                [(header::CONTENT_TYPE, "application/json")],
                value.to_string(),
            )
                .into_response();
            if let Some(filters) = filters {
                if let Ok(value) = filters.to_string().parse() {
                    resp.headers_mut().insert("x-manifest-filters", value);
                }
            }
            resp
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn asset_handler(
    State(state): State<ServerState>,
    Path(key): Path<String>,
) -> Response {
    let bytes = state.assets.lock().expect("assets lock").get(&key).cloned();
    match bytes {
        Some(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Assemble a minimal valid manifest document.
///
/// `assets` pairs a logical key with `(url, content_type, hash)`.
#[must_use]
pub fn manifest_json(
    id: Uuid,
    created_at: &str,
    runtime_version: &str,
    launch_asset: (&Url, &str, &str, &str),
    assets: &[(&Url, &str, &str, &str)],
) -> serde_json::Value {
    let entry = |(url, key, content_type, hash): &(&Url, &str, &str, &str)| {
        serde_json::json!({
            "url": url.as_str(),
            "key": key,
            "contentType": content_type,
            "hash": hash,
        })
    };
    serde_json::json!({
        "id": id.to_string(),
        "createdAt": created_at,
        "runtimeVersion": runtime_version,
        "launchAsset": entry(&launch_asset),
        "assets": assets.iter().map(entry).collect::<Vec<_>>(),
    })
}
