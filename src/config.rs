//! User configuration
//!
//! Loaded from `config.json` in the XDG config directory
//! (`~/.config/gearngo/config.json` on Linux). Every field is optional in the
//! file; anything left out takes its default. The weather API key can also
//! come from the `GEARNGO_WEATHER_KEY` environment variable, which wins over
//! the file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::data::catalog::CATALOG_BASE_URL;
use crate::data::weather::VISUAL_CROSSING_BASE_URL;
use crate::gear::DEFAULT_WEIGHT_LIMIT_GRAMS;
use crate::shell::{DEFAULT_MANIFEST, DEFAULT_SHELL_VERSION};

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable holding the weather API key
pub const WEATHER_KEY_ENV: &str = "GEARNGO_WEATHER_KEY";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `Config`
    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pack weight limit in grams
    pub weight_limit_grams: f64,
    /// Location used by `weather` when none is given
    pub default_location: Option<String>,
    pub weather_api_key: Option<String>,
    pub weather_base_url: String,
    pub catalog_base_url: String,
    /// Overrides the XDG data directory for the gear closet and weather cache
    pub data_dir: Option<PathBuf>,
    pub shell: ShellConfig,
}

/// App-shell cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Cache name; bump it to roll every client onto a fresh cache
    pub version: String,
    /// Paths cached at install time
    pub manifest: Vec<String>,
    /// Origin the shell is served from, e.g. `https://example.com/gear/`
    pub origin: Option<String>,
    /// Overrides the XDG cache directory for shell caches
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weight_limit_grams: DEFAULT_WEIGHT_LIMIT_GRAMS,
            default_location: None,
            weather_api_key: None,
            weather_base_url: VISUAL_CROSSING_BASE_URL.to_string(),
            catalog_base_url: CATALOG_BASE_URL.to_string(),
            data_dir: None,
            shell: ShellConfig::default(),
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_SHELL_VERSION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
            origin: None,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Loads the config from the XDG location, then applies the environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = match Self::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        Ok(config.with_env_key(std::env::var(WEATHER_KEY_ENV).ok()))
    }

    /// Loads the config from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replaces the API key when `key` is a non-empty value
    pub fn with_env_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.weather_api_key = Some(key);
        }
        self
    }

    /// Returns the path of the config file, if a home directory exists
    pub fn config_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "gearngo")?;
        Some(project_dirs.config_dir().join(CONFIG_FILE))
    }
}
