//! Time-bounded cache in front of the weather provider
//!
//! Each location's latest successful forecast is stored under
//! `weather-<location>` together with the time it was fetched. Lookups within
//! the freshness window never touch the network; older entries are ignored
//! (not deleted) and replaced by the next successful fetch. Failures are never
//! stored, so the next lookup simply tries again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::data::{WeatherFetcher, WeatherPayload};
use crate::storage::{set_json, StorageBackend};

/// How long a cached forecast stays fresh, in milliseconds (1 hour)
pub const WEATHER_TTL_MS: i64 = 3_600_000;

/// Prefix of weather storage keys
const WEATHER_KEY_PREFIX: &str = "weather-";

/// A stored forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCacheEntry {
    /// When the forecast was fetched, epoch milliseconds
    pub timestamp: i64,
    /// The forecast itself
    pub data: WeatherPayload,
}

impl WeatherCacheEntry {
    /// Whether the entry is still within the TTL at `now_millis`
    pub fn is_fresh(&self, now_millis: i64) -> bool {
        now_millis.saturating_sub(self.timestamp) < WEATHER_TTL_MS
    }
}

/// A stored forecast read without going to the network
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWeather {
    /// The stored forecast
    pub payload: WeatherPayload,
    /// When it was fetched
    pub fetched_at: DateTime<Utc>,
    /// Age in whole minutes at the time of reading
    pub age_minutes: i64,
    /// Whether it is still within the TTL
    pub is_fresh: bool,
}

impl CachedWeather {
    /// Short relative age such as "just now", "12m ago", "3h ago" or "2d ago"
    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes;
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Returns the storage key for `location`
pub fn cache_key(location: &str) -> String {
    format!("{}{}", WEATHER_KEY_PREFIX, location)
}

/// TTL cache for weather lookups
///
/// Like the gear store, this assumes one logical writer: two concurrent misses
/// for the same location both fetch, and the later write wins.
#[derive(Clone)]
pub struct RemoteDataCache {
    backend: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn WeatherFetcher>,
}

impl RemoteDataCache {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn WeatherFetcher>,
    ) -> Self {
        Self {
            backend,
            clock,
            fetcher,
        }
    }

    /// Returns the forecast for `location`, or `None` if none can be had
    ///
    /// # Behavior
    /// - A fresh stored entry is returned without any network call
    /// - Otherwise the provider is asked exactly once
    /// - A successful answer is stored with the current time and returned
    /// - A failed answer returns `None` and stores nothing
    pub async fn get(&self, location: &str) -> Option<WeatherPayload> {
        let now = self.clock.now_millis();

        if let Some(entry) = self.read_entry(location) {
            if entry.is_fresh(now) {
                debug!(location, age_ms = now - entry.timestamp, "Weather served from cache");
                return Some(entry.data);
            }
            debug!(location, "Cached weather is stale");
        }

        match self.fetcher.fetch_weather(location).await {
            Ok(payload) => {
                let entry = WeatherCacheEntry {
                    timestamp: self.clock.now_millis(),
                    data: payload,
                };
                if let Err(e) = set_json(self.backend.as_ref(), &cache_key(location), &entry) {
                    warn!(location, error = %e, "Failed to store weather, returning it uncached");
                } else {
                    info!(location, "Fetched and cached weather");
                }
                Some(entry.data)
            }
            Err(e) => {
                warn!(location, error = %e, "Weather fetch failed");
                None
            }
        }
    }

    /// Reads the stored forecast for `location` without any network access
    ///
    /// Stale entries are returned too, flagged by `is_fresh`.
    pub fn peek(&self, location: &str) -> Option<CachedWeather> {
        let entry = self.read_entry(location)?;
        let now = self.clock.now_millis();
        let fetched_at = DateTime::from_timestamp_millis(entry.timestamp)?;

        Some(CachedWeather {
            is_fresh: entry.is_fresh(now),
            age_minutes: now.saturating_sub(entry.timestamp) / 60_000,
            fetched_at,
            payload: entry.data,
        })
    }

    fn read_entry(&self, location: &str) -> Option<WeatherCacheEntry> {
        let raw = self.backend.get(&cache_key(location))?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(location, error = %e, "Ignoring unreadable weather entry");
                None
            }
        }
    }
}
