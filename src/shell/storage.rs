//! Named response caches
//!
//! A `CacheStorage` holds any number of named caches, each mapping a request
//! key to a stored response. Only one name is current at a time; the others
//! are removed when a new version activates.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use directories::ProjectDirs;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use super::AssetResponse;
use crate::storage::{decode_key, encode_key};

/// Errors raised by a cache storage
#[derive(Debug, Error)]
pub enum CacheStorageError {
    /// Filesystem access failed
    #[error("Cache I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stored response could not be decoded
    #[error("Corrupt cache entry at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A response could not be encoded
    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Store of named request -> response caches
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all existing caches
    async fn keys(&self) -> Result<Vec<String>, CacheStorageError>;

    /// Whether a cache named `cache` exists
    async fn has(&self, cache: &str) -> Result<bool, CacheStorageError>;

    /// Deletes a whole cache; returns whether it existed
    async fn delete(&self, cache: &str) -> Result<bool, CacheStorageError>;

    /// Stores one response, creating the cache if needed
    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &AssetResponse,
    ) -> Result<(), CacheStorageError>;

    /// Stores every entry or none of them
    async fn put_all(
        &self,
        cache: &str,
        entries: &[(String, AssetResponse)],
    ) -> Result<(), CacheStorageError>;

    /// Looks up the response stored under `key`
    async fn lookup(
        &self,
        cache: &str,
        key: &str,
    ) -> Result<Option<AssetResponse>, CacheStorageError>;

    /// Request keys stored in `cache`, empty when it does not exist
    async fn entries(&self, cache: &str) -> Result<Vec<String>, CacheStorageError>;

    /// Name of the cache last marked active, if any
    async fn active(&self) -> Result<Option<String>, CacheStorageError>;

    /// Records `cache` as the one serving requests
    async fn set_active(&self, cache: &str) -> Result<(), CacheStorageError>;
}

type Caches = BTreeMap<String, BTreeMap<String, AssetResponse>>;

/// Cache storage held in memory
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: Mutex<Caches>,
    active: Mutex<Option<String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn caches(&self) -> MutexGuard<'_, Caches> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheStorageError> {
        Ok(self.caches().keys().cloned().collect())
    }

    async fn has(&self, cache: &str) -> Result<bool, CacheStorageError> {
        Ok(self.caches().contains_key(cache))
    }

    async fn delete(&self, cache: &str) -> Result<bool, CacheStorageError> {
        Ok(self.caches().remove(cache).is_some())
    }

    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &AssetResponse,
    ) -> Result<(), CacheStorageError> {
        self.caches()
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn put_all(
        &self,
        cache: &str,
        entries: &[(String, AssetResponse)],
    ) -> Result<(), CacheStorageError> {
        let mut caches = self.caches();
        let target = caches.entry(cache.to_string()).or_default();
        for (key, response) in entries {
            target.insert(key.clone(), response.clone());
        }
        Ok(())
    }

    async fn lookup(
        &self,
        cache: &str,
        key: &str,
    ) -> Result<Option<AssetResponse>, CacheStorageError> {
        Ok(self
            .caches()
            .get(cache)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn entries(&self, cache: &str) -> Result<Vec<String>, CacheStorageError> {
        Ok(self
            .caches()
            .get(cache)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn active(&self) -> Result<Option<String>, CacheStorageError> {
        Ok(self.active.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn set_active(&self, cache: &str) -> Result<(), CacheStorageError> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(cache.to_string());
        Ok(())
    }
}

/// Prefix of in-progress install directories, never listed as caches
const STAGING_PREFIX: &str = ".staging-";

/// File under the root naming the active cache
const ACTIVE_FILE: &str = ".active";

/// Distinguishes concurrent staging directories and temp files within one process
static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_suffix() -> String {
    let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", std::process::id(), n)
}

/// Cache storage on disk: `<root>/<cache>/<key>.json`
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a DiskCacheStorage in the XDG cache directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "gearngo")?;
        Some(Self::with_dir(project_dirs.cache_dir().join("shell")))
    }

    /// Creates a DiskCacheStorage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, cache: &str) -> PathBuf {
        self.root.join(encode_key(cache))
    }

    fn entry_file(key: &str) -> String {
        format!("{}.json", encode_key(key))
    }

    fn staging_dir(&self, cache: &str) -> PathBuf {
        self.root.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            encode_key(cache),
            unique_suffix()
        ))
    }

    async fn write_entry(
        dir: &Path,
        key: &str,
        response: &AssetResponse,
    ) -> Result<(), CacheStorageError> {
        let json = serde_json::to_vec(response)?;
        Self::replace_file(&dir.join(Self::entry_file(key)), &json).await
    }

    /// Writes `contents` to a temp file next to `path`, then renames it over
    /// `path`. Concurrent writers each use their own temp file, so the last
    /// rename wins.
    async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), CacheStorageError> {
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.tmp", unique_suffix()));
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, contents)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_error(path, e));
        }
        Ok(())
    }

    /// Moves every file from `staging` into `target`, then drops `staging`
    async fn merge_staged(staging: &Path, target: &Path) -> Result<(), CacheStorageError> {
        let mut dir = fs::read_dir(staging)
            .await
            .map_err(|e| io_error(staging, e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(staging, e))? {
            let to = target.join(entry.file_name());
            fs::rename(entry.path(), &to)
                .await
                .map_err(|e| io_error(&to, e))?;
        }
        fs::remove_dir(staging)
            .await
            .map_err(|e| io_error(staging, e))
    }
}

fn io_error(path: &Path, source: io::Error) -> CacheStorageError {
    CacheStorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheStorageError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(&self.root, e))? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(STAGING_PREFIX) {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if let (true, Some(cache)) = (is_dir, decode_key(&name)) {
                names.push(cache);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, cache: &str) -> Result<bool, CacheStorageError> {
        let dir = self.cache_dir(cache);
        match fs::metadata(&dir).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir, e)),
        }
    }

    async fn delete(&self, cache: &str) -> Result<bool, CacheStorageError> {
        let dir = self.cache_dir(cache);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&dir, e)),
        }
    }

    async fn put(
        &self,
        cache: &str,
        key: &str,
        response: &AssetResponse,
    ) -> Result<(), CacheStorageError> {
        let dir = self.cache_dir(cache);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        Self::write_entry(&dir, key, response).await?;
        debug!(cache, key, "Stored cache entry");
        Ok(())
    }

    /// Writes every entry into a staging directory first
    ///
    /// A brand new cache is published with a single directory rename. When
    /// the cache already exists the staged files are moved in one by one.
    async fn put_all(
        &self,
        cache: &str,
        entries: &[(String, AssetResponse)],
    ) -> Result<(), CacheStorageError> {
        let staging = self.staging_dir(cache);
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_error(&staging, e))?;

        for (key, response) in entries {
            if let Err(e) = Self::write_entry(&staging, key, response).await {
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        }

        let target = self.cache_dir(cache);
        let committed = match self.has(cache).await {
            Ok(true) => Self::merge_staged(&staging, &target).await,
            Ok(false) => fs::rename(&staging, &target)
                .await
                .map_err(|e| io_error(&target, e)),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        debug!(cache, entries = entries.len(), "Committed cache entries");
        Ok(())
    }

    async fn lookup(
        &self,
        cache: &str,
        key: &str,
    ) -> Result<Option<AssetResponse>, CacheStorageError> {
        let path = self.cache_dir(cache).join(Self::entry_file(key));
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheStorageError::Corrupt { path, source })
    }

    async fn entries(&self, cache: &str) -> Result<Vec<String>, CacheStorageError> {
        let dir_path = self.cache_dir(cache);
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir_path, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_error(&dir_path, e))? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(key) = name.strip_suffix(".json").and_then(decode_key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn active(&self) -> Result<Option<String>, CacheStorageError> {
        let path = self.root.join(ACTIVE_FILE);
        match fs::read_to_string(&path).await {
            Ok(name) => Ok(Some(name.trim().to_string()).filter(|name| !name.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn set_active(&self, cache: &str) -> Result<(), CacheStorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;
        Self::replace_file(&self.root.join(ACTIVE_FILE), cache.as_bytes()).await?;
        debug!(cache, "Marked cache active");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (DiskCacheStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = DiskCacheStorage::with_dir(temp_dir.path().join("shell"));
        (storage, temp_dir)
    }

    fn page(body: &str) -> AssetResponse {
        AssetResponse::ok("text/html", body)
    }

    #[tokio::test]
    async fn test_memory_put_lookup_delete() {
        let storage = MemoryCacheStorage::new();

        storage.put("v1", "./", &page("root")).await.expect("put");

        assert!(storage.has("v1").await.expect("has"));
        assert_eq!(
            storage.lookup("v1", "./").await.expect("lookup"),
            Some(page("root"))
        );
        assert!(storage.lookup("v2", "./").await.expect("lookup").is_none());
        assert!(storage.delete("v1").await.expect("delete"));
        assert!(!storage.delete("v1").await.expect("delete again"));
        assert!(storage.keys().await.expect("keys").is_empty());
    }

    #[tokio::test]
    async fn test_disk_missing_root_is_empty() {
        let (storage, _temp) = create_test_storage();

        assert!(storage.keys().await.expect("keys").is_empty());
        assert!(!storage.has("v1").await.expect("has"));
        assert!(storage.entries("v1").await.expect("entries").is_empty());
        assert!(storage.lookup("v1", "./").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_disk_put_and_lookup() {
        let (storage, _temp) = create_test_storage();
        let css = AssetResponse::ok("text/css", "body { margin: 0 }");

        storage
            .put("gear-n-go-v1", "./src/css/styles.css", &css)
            .await
            .expect("put");

        assert_eq!(storage.keys().await.expect("keys"), vec!["gear-n-go-v1"]);
        assert_eq!(
            storage
                .lookup("gear-n-go-v1", "./src/css/styles.css")
                .await
                .expect("lookup"),
            Some(css)
        );
        assert_eq!(
            storage.entries("gear-n-go-v1").await.expect("entries"),
            vec!["./src/css/styles.css"]
        );
    }

    #[tokio::test]
    async fn test_disk_put_all_creates_cache_in_one_step() {
        let (storage, _temp) = create_test_storage();
        let entries = vec![
            ("./".to_string(), page("root")),
            ("./index.html".to_string(), page("index")),
        ];

        storage.put_all("v2", &entries).await.expect("put_all");

        assert_eq!(storage.keys().await.expect("keys"), vec!["v2"]);
        assert_eq!(
            storage.entries("v2").await.expect("entries"),
            vec!["./", "./index.html"]
        );

        // No staging leftovers next to the cache
        let mut dir = fs::read_dir(storage.root()).await.expect("read root");
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.expect("entry") {
            names.push(entry.file_name().into_string().expect("utf8"));
        }
        assert_eq!(names, vec!["v2"]);
    }

    #[tokio::test]
    async fn test_disk_put_all_merges_into_existing_cache() {
        let (storage, _temp) = create_test_storage();
        storage.put("v1", "./trip.html", &page("old trip")).await.expect("put");

        let entries = vec![
            ("./trip.html".to_string(), page("new trip")),
            ("./closet.html".to_string(), page("closet")),
        ];
        storage.put_all("v1", &entries).await.expect("put_all");

        assert_eq!(
            storage.lookup("v1", "./trip.html").await.expect("lookup"),
            Some(page("new trip"))
        );
        assert_eq!(storage.entries("v1").await.expect("entries").len(), 2);
    }

    #[tokio::test]
    async fn test_disk_delete() {
        let (storage, _temp) = create_test_storage();
        storage.put("v1", "./", &page("root")).await.expect("put");

        assert!(storage.delete("v1").await.expect("delete"));
        assert!(!storage.delete("v1").await.expect("delete again"));
        assert!(!storage.has("v1").await.expect("has"));
    }

    #[tokio::test]
    async fn test_disk_corrupt_entry_is_error() {
        let (storage, _temp) = create_test_storage();
        storage.put("v1", "./", &page("root")).await.expect("put");

        let path = storage.cache_dir("v1").join(DiskCacheStorage::entry_file("./"));
        fs::write(&path, b"garbage").await.expect("overwrite");

        assert!(matches!(
            storage.lookup("v1", "./").await,
            Err(CacheStorageError::Corrupt { .. })
        ));
    }

    async fn root_names(storage: &DiskCacheStorage) -> Vec<String> {
        let mut dir = fs::read_dir(storage.root()).await.expect("read root");
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.expect("entry") {
            names.push(entry.file_name().into_string().expect("utf8"));
        }
        names.sort();
        names
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disk_concurrent_puts_to_one_key_all_succeed() {
        let (storage, _temp) = create_test_storage();
        let storage = std::sync::Arc::new(storage);

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move {
                    storage
                        .put("v1", "./index.html", &page(&format!("index {}", i)))
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.expect("join").expect("put");
        }

        let stored = storage
            .lookup("v1", "./index.html")
            .await
            .expect("lookup")
            .expect("entry present");
        assert!(String::from_utf8_lossy(&stored.body).starts_with("index "));

        // Only the entry itself is left, no temp files
        let mut dir = fs::read_dir(storage.cache_dir("v1")).await.expect("read cache");
        let mut count = 0;
        while dir.next_entry().await.expect("entry").is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_disk_failed_merge_removes_staging() {
        let (storage, _temp) = create_test_storage();
        storage.put("v1", "./trip.html", &page("trip")).await.expect("put");
        // A directory where the staged file should land makes the merge fail
        let blocker = storage.cache_dir("v1").join(DiskCacheStorage::entry_file("./"));
        fs::create_dir_all(blocker.join("inner"))
            .await
            .expect("create blocker");

        let entries = vec![("./".to_string(), page("root"))];
        assert!(storage.put_all("v1", &entries).await.is_err());

        assert_eq!(root_names(&storage).await, vec!["v1"]);
        assert_eq!(
            storage.lookup("v1", "./trip.html").await.expect("lookup"),
            Some(page("trip"))
        );
    }

    #[tokio::test]
    async fn test_memory_active_marker() {
        let storage = MemoryCacheStorage::new();
        assert_eq!(storage.active().await.expect("active"), None);

        storage.set_active("v1").await.expect("set");
        storage.set_active("v2").await.expect("set again");

        assert_eq!(storage.active().await.expect("active").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_disk_active_marker_is_not_a_cache() {
        let (storage, _temp) = create_test_storage();
        assert_eq!(storage.active().await.expect("active"), None);

        storage.put("v1", "./", &page("root")).await.expect("put");
        storage.set_active("v1").await.expect("set");

        let reopened = DiskCacheStorage::with_dir(storage.root().to_path_buf());
        assert_eq!(reopened.active().await.expect("active").as_deref(), Some("v1"));
        assert_eq!(reopened.keys().await.expect("keys"), vec!["v1"]);
        assert_eq!(root_names(&storage).await, vec![".active", "v1"]);
    }

    #[test]
    fn test_new_uses_xdg_cache_dir() {
        if let Some(storage) = DiskCacheStorage::new() {
            let root = storage.root().to_string_lossy();
            assert!(root.contains("gearngo"), "Root should be under gearngo: {}", root);
            assert!(root.ends_with("shell"));
        }
    }
}
