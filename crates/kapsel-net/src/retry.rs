#![forbid(unsafe_code)]

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::{
    error::{NetError, NetResult},
    traits::{ByteStream, Net, NetResponse},
    types::{Headers, RetryPolicy},
};

/// Retry decorator for [`Net`] implementations.
///
/// Wraps a single-attempt transport and re-issues requests that failed with a
/// retryable error, with the policy's exponential backoff between attempts.
/// Non-retryable errors (4xx, cancellation) return immediately.
#[derive(Clone)]
pub struct RetryNet<N> {
    inner: N,
    policy: RetryPolicy,
}

impl<N: Net> RetryNet<N> {
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn should_retry(&self, error: &NetError, attempt: u32) -> bool {
        attempt < self.policy.max_retries && error.is_retryable()
    }
}

#[async_trait]
impl<N: Net> Net for RetryNet<N> {
    async fn get(&self, url: Url, headers: Option<Headers>) -> NetResult<NetResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.get(url.clone(), headers.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(%url, attempt, ?delay, %error, "retrying request");
                    sleep(delay).await;
                }
            }
        }
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> NetResult<ByteStream> {
        let mut attempt = 0;
        loop {
            match self.inner.stream(url.clone(), headers.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(%url, attempt, ?delay, %error, "retrying stream");
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use rstest::rstest;
    use unimock::{MockFn, Unimock, matching};

    use super::*;
    use crate::traits::NetMock;

    fn url() -> Url {
        Url::parse("https://updates.example.com/manifest").unwrap()
    }

    fn ok_response() -> NetResponse {
        let mut headers = Headers::new();
        headers.insert("content-type", "application/json");
        NetResponse {
            status: 200,
            headers,
            body: Bytes::from_static(b"{}"),
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[rstest]
    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let mock = Unimock::new(
            NetMock::get
                .some_call(matching!(_, _))
                .returns(Ok(ok_response())),
        );
        let net = RetryNet::new(mock, fast_policy(3));

        assert!(net.get(url(), None).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let mock = Unimock::new((
            NetMock::get
                .next_call(matching!(_, _))
                .returns(Err(NetError::Timeout)),
            NetMock::get
                .next_call(matching!(_, _))
                .returns(Err(NetError::Network("reset".into()))),
            NetMock::get
                .next_call(matching!(_, _))
                .returns(Ok(ok_response())),
        ));
        let net = RetryNet::new(mock, fast_policy(3));

        assert!(net.get(url(), None).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let mock = Unimock::new(
            NetMock::get
                .each_call(matching!(_, _))
                .returns(Err(NetError::Timeout)),
        );
        let net = RetryNet::new(mock, fast_policy(2));

        assert!(matches!(
            net.get(url(), None).await.unwrap_err(),
            NetError::Timeout
        ));
    }

    #[rstest]
    #[case::not_found(404)]
    #[case::gone(410)]
    #[tokio::test]
    async fn client_errors_are_never_retried(#[case] status: u16) {
        let mock = Unimock::new(
            NetMock::get
                .some_call(matching!(_, _))
                .returns(Err(NetError::Http {
                    url: url(),
                    status,
                })),
        );
        let net = RetryNet::new(mock, fast_policy(5));

        let err = net.get(url(), None).await.unwrap_err();
        assert!(matches!(err, NetError::Http { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn server_errors_are_retried() {
        let mock = Unimock::new((
            NetMock::get
                .next_call(matching!(_, _))
                .returns(Err(NetError::Http {
                    url: url(),
                    status: 503,
                })),
            NetMock::get
                .next_call(matching!(_, _))
                .returns(Ok(ok_response())),
        ));
        let net = RetryNet::new(mock, fast_policy(1));

        assert!(net.get(url(), None).await.is_ok());
    }
}
