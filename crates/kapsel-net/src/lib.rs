#![forbid(unsafe_code)]

//! HTTP transport and download operations for the update client.
//!
//! [`HttpClient`] is a single-attempt primitive: it never retries. Retry and
//! backoff policy belong to callers, who compose [`RetryNet`] around any
//! [`Net`] implementation so each orchestration layer can pick its own
//! bounds without duplicating HTTP logic. [`Downloader`] adds the three
//! domain operations on top: manifest download (with response validation and
//! parsing), in-memory asset download, and streaming file download with an
//! atomic temp-file rename.

mod client;
mod download;
mod error;
mod retry;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    download::{Downloader, ManifestResponse},
    error::{DownloadError, DownloadResult, NetError, NetResult},
    retry::RetryNet,
    traits::{ByteStream, Net, NetExt, NetResponse},
    types::{Headers, NetOptions, RetryPolicy},
};
