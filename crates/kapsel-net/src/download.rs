#![forbid(unsafe_code)]

use std::path::Path;

use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use kapsel_core::{Manifest, ManifestFilters, PendingAsset, Update};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{
    error::{DownloadError, DownloadResult},
    traits::{Net, NetExt},
    types::Headers,
};

/// Response header carrying server-defined manifest filters as a JSON object.
const MANIFEST_FILTERS_HEADER: &str = "x-manifest-filters";

/// A downloaded, parsed manifest plus everything the server sent alongside.
#[derive(Clone, Debug)]
pub struct ManifestResponse {
    /// The described update, in `Pending` state.
    pub update: Update,
    /// Declared assets, launch asset first.
    pub assets: Vec<PendingAsset>,
    /// Server-defined manifest filters, when the response carried them.
    pub filters: Option<ManifestFilters>,
}

/// Update-domain download operations over a [`Net`] transport.
///
/// Single-attempt like the transport underneath: pass a
/// [`RetryNet`](crate::RetryNet)-wrapped client to get retry behavior.
#[derive(Clone)]
pub struct Downloader<N> {
    net: N,
    cancel: CancellationToken,
}

impl<N: Net> Downloader<N> {
    pub fn new(net: N, cancel: CancellationToken) -> Self {
        Self { net, cancel }
    }

    /// Fetch and parse an update manifest.
    ///
    /// Requires a 2xx response with a JSON content type. The parsed update
    /// starts `Pending`; its declared assets come back as [`PendingAsset`]s
    /// for the caller to download and persist.
    pub async fn download_manifest(
        &self,
        url: Url,
        headers: Option<Headers>,
    ) -> DownloadResult<ManifestResponse> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let resp = self.net.get(url.clone(), headers).await?;

        let is_json = resp
            .content_type()
            .is_some_and(|ct| ct.contains("json"));
        if !is_json {
            return Err(DownloadError::InvalidManifest(format!(
                "unexpected content type: {:?}",
                resp.content_type()
            )));
        }

        let filters = resp
            .headers
            .get(MANIFEST_FILTERS_HEADER)
            .map(|raw| {
                serde_json::from_str::<ManifestFilters>(raw).map_err(|e| {
                    DownloadError::InvalidManifest(format!("bad manifest filters header: {e}"))
                })
            })
            .transpose()?;

        let manifest = Manifest::parse(&resp.body)?;
        let update = manifest.to_update(Utc::now());
        let assets = manifest.pending_assets();
        debug!(update = %update.id, assets = assets.len(), %url, "manifest downloaded");
        Ok(ManifestResponse {
            update,
            assets,
            filters,
        })
    }

    /// Fetch raw asset bytes into memory. The caller hashes and persists.
    pub async fn download_asset(
        &self,
        url: Url,
        headers: Option<Headers>,
    ) -> DownloadResult<Bytes> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(self.net.get_bytes(url, headers).await?)
    }

    /// Stream a payload straight to `dest` without buffering it in memory.
    ///
    /// Bytes land in a uniquely named temp file in `dest`'s directory and are
    /// renamed over `dest` only after the stream completes, so a cancelled or
    /// failed download never leaves a partial file at the final path. Returns
    /// the byte count written.
    pub async fn download_file(
        &self,
        url: Url,
        headers: Option<Headers>,
        dest: &Path,
    ) -> DownloadResult<u64> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let parent = dest.parent().ok_or_else(|| {
            DownloadError::Io(std::io::Error::other("destination has no parent directory"))
        })?;
        tokio::fs::create_dir_all(parent).await?;

        let mut stream = self.net.stream(url.clone(), headers).await?;

        // Temp file in the same directory: rename stays on one filesystem
        // and is atomic. Dropped (and unlinked) automatically on error.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    std::io::Write::write_all(&mut tmp, &bytes)?;
                    written += bytes.len() as u64;
                }
                Some(Err(err)) => return Err(err.into()),
                None => break,
            }
        }

        tmp.persist(dest).map_err(|e| DownloadError::Io(e.error))?;
        debug!(%url, dest = %dest.display(), written, "file downloaded");
        Ok(written)
    }
}
