#![forbid(unsafe_code)]

use kapsel_core::CoreError;
use thiserror::Error;
use url::Url;

/// Transport-level errors.
#[derive(Clone, Debug, Error)]
pub enum NetError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("http status {status} for {url}")]
    Http { url: Url, status: u16 },

    #[error("request cancelled")]
    Cancelled,
}

impl NetError {
    /// Transient errors are worth another attempt; client errors and
    /// cancellation are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;

/// Errors from the download operations in [`Downloader`](crate::Downloader).
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Net(NetError),

    #[error("server returned status {status}")]
    Server { status: u16 },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether a retry could plausibly succeed. Parse failures and checksum
    /// mismatches are permanent for a given update id: a corrected bundle
    /// arrives as a new update, never as a changed response for the old one.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Net(net) => net.is_retryable(),
            Self::Server { status } => *status >= 500,
            Self::Io(_) => false,
            Self::InvalidManifest(_) | Self::ChecksumMismatch { .. } | Self::Cancelled => false,
        }
    }
}

impl From<NetError> for DownloadError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Http { status, .. } => Self::Server { status },
            NetError::Cancelled => Self::Cancelled,
            other => Self::Net(other),
        }
    }
}

impl From<CoreError> for DownloadError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidManifest(msg) => Self::InvalidManifest(msg),
            other => Self::InvalidManifest(other.to_string()),
        }
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn url() -> Url {
        Url::parse("https://updates.example.com/manifest").unwrap()
    }

    #[rstest]
    #[case::network(NetError::Network("reset".into()), true)]
    #[case::timeout(NetError::Timeout, true)]
    #[case::server_error(NetError::Http { url: url(), status: 503 }, true)]
    #[case::client_error(NetError::Http { url: url(), status: 404 }, false)]
    #[case::cancelled(NetError::Cancelled, false)]
    fn retryability(#[case] err: NetError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }

    #[rstest]
    #[case::http_becomes_server(NetError::Http { url: url(), status: 500 })]
    fn http_errors_surface_as_server_errors(#[case] err: NetError) {
        assert!(matches!(
            DownloadError::from(err),
            DownloadError::Server { status: 500 }
        ));
    }

    #[rstest]
    #[case::server_5xx(DownloadError::Server { status: 502 }, true)]
    #[case::server_4xx(DownloadError::Server { status: 404 }, false)]
    #[case::bad_manifest(DownloadError::InvalidManifest("eof".into()), false)]
    #[case::checksum(
        DownloadError::ChecksumMismatch { expected: "aa".into(), actual: "bb".into() },
        false
    )]
    fn transience(#[case] err: DownloadError, #[case] transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }
}
