//! HTTP fetch source
//!
//! A [`Fetcher`] that GETs a JSON document over HTTP(S). This is what the
//! `watch` command polls when a fetch URL is configured.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::Fetcher;

/// Default per-request timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches and decodes a JSON document from a fixed URL
#[derive(Debug)]
pub struct HttpFetcher<T = serde_json::Value> {
    client: reqwest::Client,
    url: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> HttpFetcher<T> {
    /// Create a fetcher for `url` with the default timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher for `url` with a per-request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        validate_http_url(&url)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dashsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            _payload: PhantomData,
        })
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<T> Fetcher<T> for HttpFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<T> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::FetchFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::FetchFailed {
            url: self.url.clone(),
            message: e.to_string(),
        })?;
        debug!(url = %self.url, bytes = body.len(), "Fetched document");

        serde_json::from_slice(&body).map_err(|e| Error::FetchDecode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

/// Accept only absolute http:// and https:// URLs
pub fn validate_http_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| Error::FetchFailed {
        url: url.to_string(),
        message: format!("invalid URL: {}", e),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::FetchFailed {
            url: url.to_string(),
            message: format!("unsupported scheme '{}', expected http or https", other),
        }),
    }
}
