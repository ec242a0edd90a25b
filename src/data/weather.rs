//! Visual Crossing weather API client
//!
//! This module provides functionality to fetch a destination's forecast from
//! the Visual Crossing timeline API and map it into a `WeatherPayload`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{DailyForecast, WeatherPayload};

/// Base URL for the Visual Crossing timeline API
pub const VISUAL_CROSSING_BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline/";

/// Maximum number of body bytes kept in an error message
const MAX_ERROR_BODY_LENGTH: usize = 300;

/// Errors that can occur when fetching weather data
#[derive(Debug, Error)]
pub enum WeatherError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("Weather provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// No API key is configured
    #[error("No weather API key configured (set GEARNGO_WEATHER_KEY or weather_api_key)")]
    MissingApiKey,

    /// The request URL could not be built
    #[error("Invalid weather URL: {0}")]
    InvalidUrl(String),
}

/// Fetches the forecast for a location string
///
/// `location` is free-form: a place name ("Bogota") or "lat,lon".
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch_weather(&self, location: &str) -> Result<WeatherPayload, WeatherError>;
}

/// Client for fetching weather data from Visual Crossing
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherClient {
    /// Create a new WeatherClient against the public endpoint
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: VISUAL_CROSSING_BASE_URL.to_string(),
            api_key,
        }
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds the request URL for `location`
    ///
    /// The location becomes its own path segment, so spaces and commas are
    /// escaped rather than splitting the path.
    fn build_url(&self, location: &str, api_key: &str) -> Result<Url, WeatherError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;

        url.path_segments_mut()
            .map_err(|_| WeatherError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(location);

        url.query_pairs_mut()
            .append_pair("unitGroup", "metric")
            .append_pair("key", api_key)
            .append_pair("contentType", "json");

        Ok(url)
    }

    /// Maps the provider's response into our payload
    fn parse_response(response: TimelineResponse) -> WeatherPayload {
        let current = response.current_conditions;
        WeatherPayload {
            temp: current.temp,
            conditions: current.conditions,
            precip_prob: current.precipprob.unwrap_or(0.0),
            description: response.description,
            days: response.days,
        }
    }
}

#[async_trait]
impl WeatherFetcher for WeatherClient {
    async fn fetch_weather(&self, location: &str) -> Result<WeatherPayload, WeatherError> {
        let api_key = self.api_key.as_deref().ok_or(WeatherError::MissingApiKey)?;
        let url = self.build_url(location, api_key)?;

        debug!(location, "Fetching weather from provider");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(WeatherError::Status {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let timeline: TimelineResponse = serde_json::from_str(&text)?;
        Ok(Self::parse_response(timeline))
    }
}

/// Shortens an error body to keep messages readable
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let cut = (0..=MAX_ERROR_BODY_LENGTH)
        .rev()
        .find(|&i| body.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
}

/// Visual Crossing timeline response structure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineResponse {
    current_conditions: CurrentConditions,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    days: Option<Vec<DailyForecast>>,
}

/// Current conditions block
#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temp: f64,
    conditions: String,
    #[serde(default)]
    precipprob: Option<f64>,
}
