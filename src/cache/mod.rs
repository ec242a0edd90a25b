//! Remote data cache
//!
//! Keeps the most recent weather forecast per location in the storage
//! backend with a one hour TTL. Expired entries stay readable through
//! `RemoteDataCache::peek` so the CLI can show what it last knew while offline.

mod remote;

pub use remote::{cache_key, CachedWeather, RemoteDataCache, WeatherCacheEntry, WEATHER_TTL_MS};
