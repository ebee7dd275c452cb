#![forbid(unsafe_code)]

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
#[cfg(test)]
use unimock::unimock;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    types::Headers,
};

/// Streaming response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// A buffered 2xx response. Non-2xx statuses surface as
/// [`NetError::Http`] instead, so a `NetResponse` always carries a usable body.
#[derive(Clone, Debug)]
pub struct NetResponse {
    pub status: u16,
    /// Response headers, keys lowercased.
    pub headers: Headers,
    pub body: Bytes,
}

impl NetResponse {
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Transport seam. Implementations are single-attempt; retry behavior is
/// layered on by [`RetryNet`](crate::RetryNet) so each caller owns its own
/// policy. Implementations must be safe to call concurrently.
#[cfg_attr(test, unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Buffered GET. Fails with [`NetError::Http`] on any non-2xx status.
    async fn get(&self, url: Url, headers: Option<Headers>) -> NetResult<NetResponse>;

    /// Streaming GET for large payloads. Same status contract as [`Net::get`].
    async fn stream(&self, url: Url, headers: Option<Headers>) -> NetResult<ByteStream>;
}

/// Convenience body-only variant of [`Net::get`].
#[async_trait]
pub trait NetExt: Net {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> NetResult<Bytes> {
        Ok(self.get(url, headers).await?.body)
    }
}

#[async_trait]
impl<N: Net + ?Sized> NetExt for N {}
