//! Bundle transports.
//!
//! The loader only sees [`TranslationFetcher`]; concrete transports are
//! [`HttpFetcher`] (remote `GET`) and [`FsFetcher`] (local directory).

use std::path::PathBuf;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::bundle::TranslationData;

/// Default request timeout for [`HttpFetcher`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by a transport. The loader turns every one of them into an empty bundle.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network or client failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Local read failure
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Body is not JSON
    #[error("Failed to parse translation bundle: {0}")]
    Decode(#[from] serde_json::Error),

    /// Body is JSON but not an object
    #[error("Translation bundle at {url} is not a JSON object")]
    NotAnObject {
        /// Requested URL
        url: String,
    },
}

/// Retrieves one language's bundle by URL.
pub trait TranslationFetcher: Send + Sync + std::fmt::Debug {
    /// Fetches and decodes the JSON object at `url`.
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<TranslationData, FetchError>>;
}

/// Returns true for `http://` and `https://` URLs, which need an [`HttpFetcher`].
#[must_use]
pub fn is_remote_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Builds the bundle URL for `lang`: `{assets_url}/{lang}.json`.
#[must_use]
pub fn bundle_url(assets_url: &str, lang: &str) -> String {
    format!("{}/{lang}.json", assets_url.trim_end_matches('/'))
}

/// Accepts only top-level JSON objects.
fn into_object(value: Value, url: &str) -> Result<TranslationData, FetchError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(FetchError::NotAnObject { url: url.to_string() }),
    }
}

/// Fetches bundles over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// Shared client (connection pool)
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a 10 second request timeout.
    ///
    /// # Errors
    /// [`FetchError::Transport`] when the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl TranslationFetcher for HttpFetcher {
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<TranslationData, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();

        async move {
            tracing::debug!(%url, "GET translation bundle");
            let response = client.get(&url).send().await?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status { url, status: status.as_u16() });
            }

            let body = response.bytes().await?;
            into_object(serde_json::from_slice(&body)?, &url)
        }
        .boxed()
    }
}

/// Reads bundles from a local directory; the URL is treated as a file path.
#[derive(Debug, Clone, Default)]
pub struct FsFetcher;

impl TranslationFetcher for FsFetcher {
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<TranslationData, FetchError>> {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        let url = url.to_string();

        async move {
            tracing::debug!(path = %path.display(), "Reading translation bundle");
            let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
                FetchError::Io { path: path.display().to_string(), source }
            })?;
            into_object(serde_json::from_str(&content)?, &url)
        }
        .boxed()
    }
}
