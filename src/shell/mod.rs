//! Offline app-shell cache
//!
//! The app shell (entry pages, primary script and stylesheet) is cached under
//! a versioned name so it can be served without a network connection.
//! `AssetCacheManager` owns the lifecycle (install, activate, intercept) and
//! `ShellWorker` delivers lifecycle and fetch events to it from a channel.
//!
//! Interception is network-first: the network is always tried, successful
//! GET responses refresh the cache, and the cached copy is only used when the
//! network cannot be reached.

mod fetcher;
mod manager;
mod storage;
mod worker;

pub use fetcher::{AssetFetcher, FetchError, HttpAssetFetcher};
pub use manager::{AssetCacheManager, ShellState};
pub use storage::{CacheStorage, CacheStorageError, DiskCacheStorage, MemoryCacheStorage};
pub use worker::{ShellEvent, ShellWorker};

use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cache version used when none is configured
pub const DEFAULT_SHELL_VERSION: &str = "gear-n-go-v1";

/// App-shell paths cached at install time when none are configured
pub const DEFAULT_MANIFEST: &[&str] = &[
    "./",
    "./index.html",
    "./closet.html",
    "./trip.html",
    "./src/css/styles.css",
    "./src/js/main.js",
    "./src/js/ExternalServices.mjs",
    "./src/js/storageManager.mjs",
    "./src/js/utils.mjs",
];

/// Errors raised by the app-shell lifecycle
#[derive(Debug, Error)]
pub enum ShellError {
    /// A manifest asset could not be fetched, so nothing was cached
    #[error("Install failed at '{path}': {reason}")]
    InstallFailed { path: String, reason: String },

    /// Activation was requested before the current version was installed
    #[error("Cache '{0}' is not installed")]
    NotInstalled(String),

    /// The cache storage itself failed
    #[error(transparent)]
    Storage(#[from] CacheStorageError),

    /// The worker task is no longer running
    #[error("Shell worker has stopped")]
    WorkerStopped,
}

/// An outbound request routed through the shell cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub method: Method,
    /// Root-relative path, also used as the cache key
    pub path: String,
}

impl AssetRequest {
    /// A GET request for `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
        }
    }

    /// Key the response is cached under
    pub fn cache_key(&self) -> &str {
        &self.path
    }
}

/// A response as fetched and as cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl AssetResponse {
    /// A 200 response with the given content type and body
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where an intercepted request was answered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    /// Fresh from the network
    Network(AssetResponse),
    /// From the current cache because the network failed
    Cache(AssetResponse),
    /// Neither the network nor the cache could answer
    Unavailable,
}

impl Served {
    /// The response, if there is one
    pub fn response(&self) -> Option<&AssetResponse> {
        match self {
            Served::Network(response) | Served::Cache(response) => Some(response),
            Served::Unavailable => None,
        }
    }

    /// Short label for where the answer came from
    pub fn source(&self) -> &'static str {
        match self {
            Served::Network(_) => "network",
            Served::Cache(_) => "cache",
            Served::Unavailable => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let mut response = AssetResponse::ok("text/html", "<html></html>");
        assert!(response.is_success());
        response.status = 204;
        assert!(response.is_success());
        response.status = 304;
        assert!(!response.is_success());
        response.status = 404;
        assert!(!response.is_success());
    }

    #[test]
    fn test_served_accessors() {
        let response = AssetResponse::ok("text/css", "body {}");
        assert_eq!(Served::Cache(response.clone()).response(), Some(&response));
        assert_eq!(Served::Network(response).source(), "network");
        assert!(Served::Unavailable.response().is_none());
    }

    #[test]
    fn test_default_manifest_starts_with_root() {
        assert_eq!(DEFAULT_MANIFEST[0], "./");
        assert!(DEFAULT_MANIFEST.contains(&"./index.html"));
        assert_eq!(DEFAULT_MANIFEST.len(), 9);
    }

    #[test]
    fn test_get_request_keys_on_path() {
        let request = AssetRequest::get("./trip.html");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.cache_key(), "./trip.html");
    }
}
