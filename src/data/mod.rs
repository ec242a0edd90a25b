//! Data exchanged with upstream services
//!
//! This module contains the payloads fetched from the weather provider and
//! the product catalog, plus the clients that fetch them.

pub mod catalog;
pub mod weather;

pub use catalog::{CatalogClient, CatalogError};
pub use weather::{WeatherClient, WeatherError, WeatherFetcher};

use serde::{Deserialize, Serialize};

/// Forecast for a destination, as cached and consumed by the suggestions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherPayload {
    /// Current temperature in Celsius
    pub temp: f64,
    /// Current conditions text (e.g. "Rain, Partially cloudy")
    pub conditions: String,
    /// Precipitation probability, 0-100
    pub precip_prob: f64,
    /// Provider's summary of the coming days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Multi-day forecast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<DailyForecast>>,
}

/// One day of the multi-day forecast
///
/// Field names follow the provider's, which is also how they are cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    /// Date (YYYY-MM-DD)
    pub datetime: String,
    /// Maximum temperature in Celsius
    #[serde(default)]
    pub tempmax: Option<f64>,
    /// Minimum temperature in Celsius
    #[serde(default)]
    pub tempmin: Option<f64>,
    /// Precipitation probability, 0-100
    #[serde(default)]
    pub precipprob: Option<f64>,
    /// Conditions text
    #[serde(default)]
    pub conditions: Option<String>,
}

/// A product from the upstream gear catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog product id
    pub id: String,
    /// Product name
    pub name: String,
    /// Brand name
    pub brand: String,
    /// Weight in grams, 0 when the catalog has none
    pub weight: f64,
    /// Category the product was found under
    pub category: String,
    /// Always "api" for catalog products
    pub source: String,
}
