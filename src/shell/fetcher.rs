//! Network access for app-shell assets

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use thiserror::Error;
use tracing::debug;

use super::{AssetRequest, AssetResponse};

/// Errors raised when an asset cannot be fetched at all
///
/// A response with an error status is not a fetch error; it is returned as a
/// normal `AssetResponse`.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed (DNS, connection refused, reset...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The asset path could not be resolved against the origin
    #[error("Invalid asset URL: {0}")]
    InvalidUrl(String),

    /// The origin could not be connected to
    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

/// Performs the network half of interception
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError>;
}

/// Fetches assets over HTTP relative to an origin such as `https://example.com/app/`
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: Client,
    origin: String,
}

impl HttpAssetFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            origin: origin.into(),
        }
    }

    /// Resolves a root-relative path like `./index.html` against the origin
    fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        let origin = Url::parse(&self.origin).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        origin
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        let url = self.resolve(&request.path)?;
        debug!(method = %request.method, url = %url, "Fetching asset");

        let response = self
            .client
            .request(request.method.clone(), url)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FetchError::Unreachable(e.to_string())
                } else {
                    FetchError::RequestFailed(e)
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();

        Ok(AssetResponse {
            status,
            content_type,
            body,
        })
    }
}
