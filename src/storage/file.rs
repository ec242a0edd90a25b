//! File-backed storage, one JSON file per key
//!
//! Files live in an XDG-compliant data directory (`~/.local/share/gearngo/`
//! on Linux). Keys are free-form (weather keys embed place names and
//! coordinates), so they are encoded into safe file names.

use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::debug;

use super::{StorageBackend, StorageError};

/// Extension used for stored documents
const FILE_EXTENSION: &str = "json";

/// Stores each key as `<data_dir>/<encoded key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Directory where documents are stored
    data_dir: PathBuf,
}

impl FileStorage {
    /// Creates a FileStorage in the XDG data directory
    ///
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "gearngo")?;
        Some(Self::with_dir(project_dirs.data_dir().to_path_buf()))
    }

    /// Creates a FileStorage rooted at a custom directory
    pub fn with_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the directory documents are written to
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Returns the path of the file backing `key`
    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", encode_key(key), FILE_EXTENSION))
    }

    fn io_error(key: &str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    /// Writes through a temporary file and renames it into place, so a crash
    /// mid-write never leaves a truncated document behind.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir).map_err(|e| Self::io_error(key, e))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| Self::io_error(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| Self::io_error(key, e))?;

        debug!(key, path = %path.display(), "stored document");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key, e)),
        }
    }

    fn keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.data_dir) else {
            return Vec::new();
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let stem = name.strip_suffix(&format!(".{}", FILE_EXTENSION))?;
                decode_key(stem)
            })
            .collect()
    }
}

/// Encodes a key into a portable file name
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX` (uppercase hex).
pub(crate) fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Reverses `encode_key`; returns `None` for names it could not have produced
pub(crate) fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
