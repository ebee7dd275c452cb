use std::time::Duration;

use kapsel_net::{
    DownloadError, Downloader, HttpClient, NetOptions, RetryNet, RetryPolicy,
};
use kapsel_test_utils::{TestUpdateServer, manifest_json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn client() -> HttpClient {
    HttpClient::new(NetOptions::default())
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_retries,
        Duration::from_millis(1),
        Duration::from_millis(10),
    )
}

async fn server_with_manifest() -> (TestUpdateServer, Uuid) {
    let server = TestUpdateServer::start().await;
    let id = Uuid::new_v4();
    let (bundle_url, bundle_hash) = server.add_asset("bundle", &b"launch-bytes"[..]);
    let (logo_url, logo_hash) = server.add_asset("logo", &b"logo-bytes"[..]);
    server.set_manifest(manifest_json(
        id,
        "2026-05-01T12:00:00Z",
        "2.0.0",
        (&bundle_url, "bundle", "js", &bundle_hash),
        &[(&logo_url, "logo", "png", &logo_hash)],
    ));
    (server, id)
}

#[tokio::test]
async fn manifest_downloads_and_parses() {
    let (server, id) = server_with_manifest().await;
    let downloader = Downloader::new(client(), CancellationToken::new());

    let resp = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap();

    assert_eq!(resp.update.id, id);
    assert_eq!(resp.update.runtime_version, "2.0.0");
    assert_eq!(resp.assets.len(), 2);
    assert!(resp.assets[0].is_launch_asset);
    assert_eq!(resp.assets[1].key, "logo");
    assert!(resp.filters.is_none());
}

#[tokio::test]
async fn server_defined_filters_ride_the_manifest_response() {
    let (server, _) = server_with_manifest().await;
    server.set_manifest_filters(serde_json::json!({ "channel": "stable" }));
    let downloader = Downloader::new(client(), CancellationToken::new());

    let resp = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap();

    let filters = resp.filters.unwrap();
    assert!(!filters.is_empty());
}

#[tokio::test]
async fn manifest_server_error_is_typed_with_status() {
    let (server, _) = server_with_manifest().await;
    server.fail_next_manifest_requests(1, 500);
    let downloader = Downloader::new(client(), CancellationToken::new());

    let err = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Server { status: 500 }));
}

#[tokio::test]
async fn manifest_with_wrong_content_type_is_invalid() {
    let server = TestUpdateServer::start().await;
    // An asset endpoint serves octet-stream; pointing the manifest download
    // at it must fail on content type, before any parsing.
    let (url, _) = server.add_asset("not-a-manifest", &b"{}"[..]);
    let downloader = Downloader::new(client(), CancellationToken::new());

    let err = downloader.download_manifest(url, None).await.unwrap_err();
    assert!(matches!(err, DownloadError::InvalidManifest(_)));
}

#[tokio::test]
async fn malformed_manifest_body_is_invalid() {
    let server = TestUpdateServer::start().await;
    server.set_manifest(serde_json::json!({ "id": "not-a-uuid" }));
    let downloader = Downloader::new(client(), CancellationToken::new());

    let err = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::InvalidManifest(_)));
}

#[tokio::test]
async fn asset_bytes_round_trip() {
    let server = TestUpdateServer::start().await;
    let (url, _) = server.add_asset("blob", &b"some asset bytes"[..]);
    let downloader = Downloader::new(client(), CancellationToken::new());

    let bytes = downloader.download_asset(url, None).await.unwrap();
    assert_eq!(&bytes[..], b"some asset bytes");
}

#[tokio::test]
async fn file_download_lands_atomically_at_dest() {
    let server = TestUpdateServer::start().await;
    let (url, _) = server.add_asset("bundle", &b"file payload"[..]);
    let downloader = Downloader::new(client(), CancellationToken::new());

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.js");
    let written = downloader.download_file(url, None, &dest).await.unwrap();

    assert_eq!(written, 12);
    assert_eq!(std::fs::read(&dest).unwrap(), b"file payload");
    // Nothing else (no temp leftovers) in the directory.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn failed_file_download_leaves_no_file() {
    let server = TestUpdateServer::start().await;
    let downloader = Downloader::new(client(), CancellationToken::new());

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("missing.js");
    let err = downloader
        .download_file(server.url("/assets/unknown"), None, &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Server { status: 404 }));
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn cancelled_download_reports_cancelled_and_writes_nothing() {
    let server = TestUpdateServer::start().await;
    let (url, _) = server.add_asset("bundle", &b"payload"[..]);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let downloader = Downloader::new(client(), cancel);

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("bundle.js");
    let err = downloader
        .download_file(url.clone(), None, &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));
    assert!(!dest.exists());

    let err = downloader.download_asset(url, None).await.unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));
}

#[tokio::test]
async fn retry_decorator_recovers_from_transient_server_errors() {
    let (server, id) = server_with_manifest().await;
    server.fail_next_manifest_requests(2, 503);

    let net = RetryNet::new(client(), fast_retries(3));
    let downloader = Downloader::new(net, CancellationToken::new());

    let resp = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap();
    assert_eq!(resp.update.id, id);
    assert_eq!(server.manifest_requests(), 3);
}

#[tokio::test]
async fn retry_decorator_gives_up_after_bound() {
    let (server, _) = server_with_manifest().await;
    server.fail_next_manifest_requests(10, 503);

    let net = RetryNet::new(client(), fast_retries(2));
    let downloader = Downloader::new(net, CancellationToken::new());

    let err = downloader
        .download_manifest(server.manifest_url(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Server { status: 503 }));
    // 1 initial + 2 retries.
    assert_eq!(server.manifest_requests(), 3);
}
