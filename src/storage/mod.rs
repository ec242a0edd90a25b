//! Durable key-value storage
//!
//! A `StorageBackend` is a string-keyed map of JSON documents that survives
//! process restarts. The gear closet and the weather cache both sit on top of
//! one shared backend, so it is handed around as `Arc<dyn StorageBackend>`.

mod file;
mod memory;

pub use file::FileStorage;
pub(crate) use file::{decode_key, encode_key};
pub use memory::MemoryStorage;

use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the underlying medium failed
    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded as JSON
    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A process-wide map from keys to JSON strings
///
/// Implementations must be safe to share between tasks. Reads never fail:
/// a key that cannot be read is reported as absent.
pub trait StorageBackend: Send + Sync {
    /// Returns the raw JSON string stored under `key`, if any
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Returns every key currently stored
    fn keys(&self) -> Vec<String>;
}

/// Serializes `value` and stores it under `key`
pub fn set_json<T: serde::Serialize + ?Sized>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    backend.set(key, &json)
}
