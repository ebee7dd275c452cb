use std::{path::Path, time::Duration};

use kapsel::{
    CheckResult, RetryPolicy, UpdateClient, UpdateEvent, UpdatesConfig, UpdatesError,
};
use kapsel_net::DownloadError;
use kapsel_test_utils::{TestUpdateServer, manifest_json};
use tempfile::TempDir;
use uuid::Uuid;

async fn write_embedded(dir: &Path) {
    let manifest = serde_json::json!({
        "id": Uuid::new_v4().to_string(),
        "createdAt": "2020-01-01T00:00:00Z",
        "runtimeVersion": "1.0.0",
        "launchAsset": {
            "url": "https://unused.example.com/bundle",
            "key": "bundle",
            "contentType": "js",
        },
    });
    tokio::fs::write(
        dir.join("manifest.json"),
        serde_json::to_vec(&manifest).unwrap(),
    )
    .await
    .unwrap();
    tokio::fs::write(dir.join("bundle"), b"embedded bundle").await.unwrap();
}

fn config_for(server: &TestUpdateServer, storage: &Path, embedded: Option<&Path>) -> UpdatesConfig {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let mut config = UpdatesConfig::new(server.manifest_url(), "1.0.0", storage).with_retry(
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5)),
    );
    if let Some(embedded) = embedded {
        config = config.with_embedded_dir(embedded);
    }
    config
}

/// Serve an update whose bundle and logo live on `server`, with `marker`
/// distinguishing the bundle bytes.
fn serve_update(server: &TestUpdateServer, created_at: &str, marker: &str) -> Uuid {
    let id = Uuid::new_v4();
    let bundle_bytes = format!("bundle bytes {marker}").into_bytes();
    let (bundle_url, bundle_hash) = server.add_asset(&format!("bundle-{marker}"), bundle_bytes);
    let (logo_url, logo_hash) = server.add_asset("logo", &b"shared logo bytes"[..]);
    server.set_manifest(manifest_json(
        id,
        created_at,
        "1.0.0",
        (&bundle_url, &format!("bundle-{marker}"), "js", &bundle_hash),
        &[(&logo_url, "logo", "png", &logo_hash)],
    ));
    id
}

#[tokio::test]
async fn embedded_fallback_when_store_is_empty() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    let launched = client.start().await.unwrap();

    assert!(launched.is_embedded);
    assert!(launched.launch_asset_path.exists());
    assert_eq!(
        client.launched_update().await.unwrap().update.id,
        launched.update.id
    );
}

#[tokio::test]
async fn start_without_updates_or_embedded_fails_typed() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();

    let client = UpdateClient::new(config_for(&server, storage.path(), None))
        .await
        .unwrap();
    let err = client.start().await.unwrap_err();
    assert!(matches!(
        err,
        UpdatesError::Launch(kapsel::LaunchError::NoLaunchableUpdate)
    ));
}

#[tokio::test]
async fn fetch_then_relaunch_activates_downloaded_update() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;
    let update_id = serve_update(&server, "2026-03-01T00:00:00Z", "one");

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    let mut events = client.subscribe();

    client.start().await.unwrap();
    let fetched = client.fetch_update().await.unwrap();
    assert_eq!(fetched, Some(update_id));

    let launched = client.request_relaunch().await.unwrap();
    assert!(!launched.is_embedded);
    assert_eq!(launched.update.id, update_id);
    assert_eq!(
        tokio::fs::read(&launched.launch_asset_path).await.unwrap(),
        b"bundle bytes one"
    );
    assert!(launched.asset_map.contains_key("logo"));
    assert!(launched.asset_map["logo"].exists());

    // Event order: launch, check, available, loaded, relaunch.
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], UpdateEvent::Launched { is_embedded: true, .. }));
    assert!(seen.contains(&UpdateEvent::CheckStarted));
    assert!(seen.contains(&UpdateEvent::UpdateAvailable { update_id }));
    assert!(seen.contains(&UpdateEvent::UpdateLoaded { update_id }));
    assert!(matches!(
        seen.last().unwrap(),
        UpdateEvent::Launched { is_embedded: false, .. }
    ));
}

#[tokio::test]
async fn launched_update_is_not_redownloaded() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;
    serve_update(&server, "2026-03-01T00:00:00Z", "one");

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    client.start().await.unwrap();
    client.fetch_update().await.unwrap();
    client.request_relaunch().await.unwrap();

    // Same manifest still on the server: nothing new to do.
    let result = client.check_for_update().await.unwrap();
    assert!(matches!(result, CheckResult::UpToDate));
    assert_eq!(client.fetch_update().await.unwrap(), None);
}

#[tokio::test]
async fn checksum_mismatch_fails_permanently() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;

    let id = Uuid::new_v4();
    let (bundle_url, _) = server.add_asset("bundle", &b"actual bytes"[..]);
    server.set_manifest(manifest_json(
        id,
        "2026-03-01T00:00:00Z",
        "1.0.0",
        (&bundle_url, "bundle", "js", "deadbeef"),
        &[],
    ));

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    client.start().await.unwrap();

    let err = client.fetch_update().await.unwrap_err();
    assert!(matches!(
        err,
        UpdatesError::Download(DownloadError::ChecksumMismatch { .. })
    ));

    // The id is burned: the same manifest is no longer offered.
    let result = client.check_for_update().await.unwrap();
    assert!(matches!(result, CheckResult::UpToDate));

    // And the broken update never launches.
    let launched = client.request_relaunch().await.unwrap();
    assert!(launched.is_embedded);
}

#[tokio::test]
async fn shared_assets_are_stored_once_and_survive_the_reaper() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    client.start().await.unwrap();

    // Generation one.
    serve_update(&server, "2026-03-01T00:00:00Z", "one");
    client.fetch_update().await.unwrap();
    let gen1 = client.request_relaunch().await.unwrap();
    let gen1_bundle = gen1.launch_asset_path.clone();
    let shared_logo = gen1.asset_map["logo"].clone();

    // Generation two shares the logo.
    serve_update(&server, "2026-04-01T00:00:00Z", "two");
    client.fetch_update().await.unwrap();
    let gen2 = client.request_relaunch().await.unwrap();
    assert_eq!(gen2.asset_map["logo"], shared_logo);

    // Generation three; start() sweeps with gen3 launched, so gen1 (beyond
    // the single rollback generation) is reclaimed.
    serve_update(&server, "2026-05-01T00:00:00Z", "three");
    client.fetch_update().await.unwrap();
    let gen3 = client.start().await.unwrap();
    assert!(!gen3.is_embedded);

    assert!(!gen1_bundle.exists(), "gen1 bundle should be reaped");
    assert!(gen2.launch_asset_path.exists(), "rollback buffer kept");
    assert!(gen3.launch_asset_path.exists());
    assert!(shared_logo.exists(), "shared asset still referenced");
}

#[tokio::test]
async fn manifest_server_errors_do_not_touch_the_store() {
    let server = TestUpdateServer::start().await;
    let storage = TempDir::new().unwrap();
    let embedded = TempDir::new().unwrap();
    write_embedded(embedded.path()).await;
    serve_update(&server, "2026-03-01T00:00:00Z", "one");
    // Beyond the single configured retry.
    server.fail_next_manifest_requests(5, 500);

    let client = UpdateClient::new(config_for(&server, storage.path(), Some(embedded.path())))
        .await
        .unwrap();
    client.start().await.unwrap();

    let err = client.check_for_update().await.unwrap_err();
    assert!(matches!(
        err,
        UpdatesError::Download(DownloadError::Server { status: 500 })
    ));

    // Nothing was persisted: a relaunch still lands on the embedded bundle.
    let launched = client.request_relaunch().await.unwrap();
    assert!(launched.is_embedded);
}
