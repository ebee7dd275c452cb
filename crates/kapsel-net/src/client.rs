#![forbid(unsafe_code)]

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, Net, NetResponse},
    types::{Headers, NetOptions},
};

/// Production [`Net`] implementation over a shared `reqwest` client.
///
/// The connection pool is the only state shared between calls, so one client
/// can serve any number of concurrent downloads.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(NetOptions::default())
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get(&self, url: Url, headers: Option<Headers>) -> NetResult<NetResponse> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);
        let req = req.timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            return Err(NetError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let mut headers = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v);
            }
        }

        let body = resp.bytes().await.map_err(NetError::from)?;
        Ok(NetResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> NetResult<ByteStream> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers);
        // No request timeout for streaming; large downloads take as long as
        // they take. Stalls surface as transport errors from the pool.

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();

        if !status.is_success() {
            return Err(NetError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }
}
