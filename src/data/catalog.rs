//! Product catalog client
//!
//! Searches the upstream gear catalog by category and looks products up by
//! id, mapping the catalog's envelope into `CatalogItem`s that can be
//! imported into the closet.

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::CatalogItem;

/// Base URL for the product catalog
pub const CATALOG_BASE_URL: &str = "https://wdd330-backend.onrender.com/";

/// Source tag stamped on catalog products
const CATALOG_SOURCE: &str = "api";

/// Errors that can occur when querying the catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The catalog answered with a non-success status
    #[error("Catalog returned status {0}")]
    Status(u16),

    /// Failed to parse API response
    #[error("Failed to parse catalog response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The request URL could not be built
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// Client for the upstream product catalog
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogClient {
    /// Creates a CatalogClient against the public endpoint
    pub fn new() -> Self {
        Self::with_base_url(CATALOG_BASE_URL)
    }

    /// Creates a CatalogClient against a custom endpoint
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Searches products in `category`
    pub async fn search(&self, category: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let url = self.url(&["products", "search", category])?;
        let envelope: Envelope<Vec<Product>> = self.get_json(url).await?;

        Ok(envelope
            .result
            .into_iter()
            .map(|product| product.into_item(Some(category)))
            .collect())
    }

    /// Fetches a single product by id
    pub async fn find_by_id(&self, id: &str) -> Result<CatalogItem, CatalogError> {
        let url = self.url(&["product", id])?;
        let envelope: Envelope<Product> = self.get_json(url).await?;
        Ok(envelope.result.into_item(None))
    }

    fn url(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| CatalogError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        debug!(url = %url, "Querying catalog");
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Catalog response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "Result")]
    result: T,
}

/// A product as the catalog returns it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Product {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    brand: Option<Brand>,
    #[serde(default)]
    weight: Option<serde_json::Value>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Brand {
    #[serde(default)]
    name: String,
}

impl Product {
    /// Maps the product, preferring the searched category over the product's own
    fn into_item(self, searched_category: Option<&str>) -> CatalogItem {
        let category = searched_category
            .map(str::to_string)
            .or(self.category)
            .unwrap_or_else(|| crate::gear::DEFAULT_CATEGORY.to_string());

        CatalogItem {
            id: self.id,
            name: self.name,
            brand: self.brand.map(|b| b.name).unwrap_or_default(),
            weight: self.weight.as_ref().map(parse_weight).unwrap_or(0.0),
            category,
            source: CATALOG_SOURCE.to_string(),
        }
    }
}

/// Reads a catalog weight: numbers as is, strings by their leading number
/// ("2.5 lbs" -> 2.5), anything else as 0
fn parse_weight(value: &serde_json::Value) -> f64 {
    let weight = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => leading_number(s),
        _ => 0.0,
    };
    crate::gear::sanitize_weight(weight)
}

fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .take_while(|&(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);

    // Back off until the prefix parses, e.g. "1.2.3" -> "1.2"
    (1..=end)
        .rev()
        .find_map(|len| s[..len].parse::<f64>().ok())
        .unwrap_or(0.0)
}
