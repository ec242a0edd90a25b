//! App-shell cache lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::try_join_all;
use reqwest::Method;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AssetFetcher, AssetRequest, AssetResponse, CacheStorage, Served, ShellError};

/// Lifecycle state of the current version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Nothing has happened yet
    Idle,
    /// Manifest assets are being fetched
    Installing,
    /// Every manifest asset is cached under the current name
    Installed,
    /// Older caches are being deleted
    Activating,
    /// Intercepting requests
    Active,
    /// The last install attempt failed
    Failed,
}

/// Owns the versioned app-shell cache
///
/// Until `activate` (or `resume`) succeeds, `intercept` goes straight to the
/// network and caches nothing. Once serving, the manager keeps serving its
/// cache through later installs, whether they succeed or fail.
pub struct AssetCacheManager {
    version: String,
    manifest: Vec<String>,
    fetcher: Arc<dyn AssetFetcher>,
    storage: Arc<dyn CacheStorage>,
    state: Mutex<ShellState>,
    serving: AtomicBool,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl AssetCacheManager {
    pub fn new(
        version: impl Into<String>,
        manifest: Vec<String>,
        fetcher: Arc<dyn AssetFetcher>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        Self {
            version: version.into(),
            manifest,
            fetcher,
            storage,
            state: Mutex::new(ShellState::Idle),
            serving: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Name of the current cache
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub fn state(&self) -> ShellState {
        *self.lock_state()
    }

    /// The cache storage the manager writes to
    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    fn lock_state(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ShellState) {
        *self.lock_state() = state;
    }

    /// Whether requests are answered from the cache on network failure
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    fn start_serving(&self) {
        self.serving.store(true, Ordering::SeqCst);
        self.set_state(ShellState::Active);
    }

    /// Settles the state after an install; a serving manager stays `Active`
    fn finish_install(&self, outcome: ShellState) {
        let state = if self.is_serving() {
            ShellState::Active
        } else {
            outcome
        };
        self.set_state(state);
    }

    /// Caches every manifest asset under the current version
    ///
    /// All assets are fetched before anything is written. If any of them
    /// fails or answers with a non-2xx status, the install fails and the
    /// current cache name receives nothing. Returns the number of cached
    /// entries.
    ///
    /// An already serving manager keeps serving its cache while the install
    /// runs and after it fails.
    pub async fn install(&self) -> Result<usize, ShellError> {
        self.set_state(ShellState::Installing);
        info!(cache = %self.version, assets = self.manifest.len(), "Installing app shell");

        let fetches = self.manifest.iter().map(|path| self.fetch_manifest_entry(path));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                self.finish_install(ShellState::Failed);
                warn!(cache = %self.version, error = %e, "App shell install failed");
                return Err(e);
            }
        };

        if let Err(e) = self.storage.put_all(&self.version, &entries).await {
            self.finish_install(ShellState::Failed);
            warn!(cache = %self.version, error = %e, "Could not commit app shell");
            return Err(e.into());
        }

        self.finish_install(ShellState::Installed);
        info!(cache = %self.version, entries = entries.len(), "App shell installed");
        Ok(entries.len())
    }

    async fn fetch_manifest_entry(
        &self,
        path: &str,
    ) -> Result<(String, AssetResponse), ShellError> {
        let request = AssetRequest::get(path);
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|e| ShellError::InstallFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(ShellError::InstallFailed {
                path: path.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok((path.to_string(), response))
    }

    /// Deletes every cache other than the current one and starts intercepting
    ///
    /// The current version must have been installed, either by this manager
    /// or by an earlier process. The current version is recorded as active in
    /// storage only after the old caches are gone. Returns the names of the
    /// deleted caches.
    pub async fn activate(&self) -> Result<Vec<String>, ShellError> {
        let installed = match self.state() {
            ShellState::Installed | ShellState::Active => true,
            ShellState::Installing | ShellState::Failed => false,
            ShellState::Idle | ShellState::Activating => self.storage.has(&self.version).await?,
        };
        if !installed {
            return Err(ShellError::NotInstalled(self.version.clone()));
        }

        self.set_state(ShellState::Activating);
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name == self.version {
                continue;
            }
            if self.storage.delete(&name).await? {
                info!(cache = %name, "Deleted old cache");
                deleted.push(name);
            }
        }

        self.storage.set_active(&self.version).await?;
        self.start_serving();
        info!(cache = %self.version, "App shell active");
        Ok(deleted)
    }

    /// Starts serving when an earlier process activated the current version
    ///
    /// A version that was installed but never activated is not resumed.
    /// Returns whether the manager is now serving.
    pub async fn resume(&self) -> Result<bool, ShellError> {
        let activated = self.storage.active().await?.as_deref() == Some(self.version.as_str());
        if activated && self.storage.has(&self.version).await? {
            self.start_serving();
            debug!(cache = %self.version, "Resumed active app shell");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Answers `request` network-first
    ///
    /// Successful GET responses are copied into the current cache in the
    /// background; call `flush` to wait for those writes. When the network
    /// fails the cached copy is served, and if there is none the request is
    /// `Unavailable`.
    pub async fn intercept(&self, request: &AssetRequest) -> Served {
        let active = self.is_serving();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if active && request.method == Method::GET && response.is_success() {
                    self.store_in_background(request.cache_key(), &response);
                }
                Served::Network(response)
            }
            Err(e) if active => {
                debug!(path = %request.path, error = %e, "Network failed, trying cache");
                match self.storage.lookup(&self.version, request.cache_key()).await {
                    Ok(Some(response)) => Served::Cache(response),
                    Ok(None) => Served::Unavailable,
                    Err(e) => {
                        warn!(path = %request.path, error = %e, "Cache lookup failed");
                        Served::Unavailable
                    }
                }
            }
            Err(e) => {
                debug!(path = %request.path, error = %e, "Network failed before activation");
                Served::Unavailable
            }
        }
    }

    fn store_in_background(&self, key: &str, response: &AssetResponse) {
        let storage = Arc::clone(&self.storage);
        let cache = self.version.clone();
        let key = key.to_string();
        let response = response.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = storage.put(&cache, &key, &response).await {
                warn!(cache = %cache, key = %key, error = %e, "Failed to refresh cache entry");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits for every background cache write started so far
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache write task failed");
            }
        }
    }
}
