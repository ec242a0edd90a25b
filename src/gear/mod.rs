//! Gear closet: item model, persistent store, and derived weight figures
//!
//! - `GearItem`, `GearId`, `NewGear`, `GearPatch`: the persisted item model
//! - `GearStore`: CRUD over the `gear-closet` document
//! - `aggregate`: pure totals, category breakdown, limit percentage and tier
//! - `suggestions`: weather-driven packing hints

pub mod aggregate;
pub mod store;
pub mod suggestions;

pub use aggregate::{
    category_breakdown, packed_subset, percent_of_limit, tier, total_weight, CategoryWeight,
    WeightSummary, WeightTier, DEFAULT_WEIGHT_LIMIT_GRAMS,
};
pub use store::{GearStore, CLOSET_KEY};
pub use suggestions::{suggest, Suggestion};

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::data::CatalogItem;

/// Category used when an item has none
pub const DEFAULT_CATEGORY: &str = "Other";

/// Identifier of a gear item
///
/// Ids are persisted as JSON numbers. Older documents and user input may carry
/// them as strings, so deserialization and `FromStr` both accept numeric text;
/// after that boundary every comparison is plain integer equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GearId(pub u64);

impl fmt::Display for GearId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GearId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(GearId)
    }
}

impl Serialize for GearId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for GearId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GearIdVisitor;

        impl Visitor<'_> for GearIdVisitor {
            type Value = GearId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer id or its decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<GearId, E> {
                Ok(GearId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<GearId, E> {
                u64::try_from(v)
                    .map(GearId)
                    .map_err(|_| E::custom(format!("negative id {}", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<GearId, E> {
                if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
                    Ok(GearId(v as u64))
                } else {
                    Err(E::custom(format!("invalid id {}", v)))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<GearId, E> {
                v.parse()
                    .map_err(|_| E::custom(format!("invalid id '{}'", v)))
            }
        }

        deserializer.deserialize_any(GearIdVisitor)
    }
}

/// A piece of gear in the closet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GearItem {
    /// Unique identifier, assigned by the store
    pub id: GearId,
    /// Item name
    #[serde(default)]
    pub name: String,
    /// Manufacturer
    #[serde(default)]
    pub brand: String,
    /// Category; see `category_name` for the defaulted value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Weight in grams, never negative
    #[serde(default, deserialize_with = "lenient_weight")]
    pub weight: f64,
    /// Whether the item is packed for the current trip
    #[serde(default)]
    pub packed: bool,
    /// Free-form condition note
    #[serde(default)]
    pub condition: String,
    /// When the item was added (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<String>,
    /// Where the item came from ("api" for catalog imports)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl GearItem {
    /// Returns the category, falling back to `"Other"` when absent or blank
    pub fn category_name(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(category) if !category.is_empty() => category,
            _ => DEFAULT_CATEGORY,
        }
    }
}

/// Fields for a new item; the store assigns `id` and `added_at`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewGear {
    pub name: String,
    pub brand: String,
    pub category: Option<String>,
    pub weight: f64,
    pub packed: bool,
    pub condition: String,
    pub source: Option<String>,
}

impl From<CatalogItem> for NewGear {
    fn from(item: CatalogItem) -> Self {
        Self {
            name: item.name,
            brand: item.brand,
            category: Some(item.category),
            weight: item.weight,
            packed: false,
            condition: String::new(),
            source: Some(item.source),
        }
    }
}

/// A shallow patch: every `Some` field replaces the item's value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GearPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub weight: Option<f64>,
    pub packed: Option<bool>,
    pub condition: Option<String>,
}

impl GearPatch {
    /// A patch that only toggles `packed`
    pub fn packed(packed: bool) -> Self {
        Self {
            packed: Some(packed),
            ..Default::default()
        }
    }

    /// Applies the patch to `item` in place
    pub fn apply_to(&self, item: &mut GearItem) {
        if let Some(ref name) = self.name {
            item.name = name.clone();
        }
        if let Some(ref brand) = self.brand {
            item.brand = brand.clone();
        }
        if let Some(ref category) = self.category {
            item.category = Some(category.clone());
        }
        if let Some(weight) = self.weight {
            item.weight = sanitize_weight(weight);
        }
        if let Some(packed) = self.packed {
            item.packed = packed;
        }
        if let Some(ref condition) = self.condition {
            item.condition = condition.clone();
        }
    }
}

/// Clamps a weight to a usable value: negative or non-finite becomes 0
pub fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Reads a weight from whatever JSON value is stored
///
/// Numbers are taken as is, numeric strings are parsed, and anything else
/// (null, booleans, garbage text) counts as 0.
fn lenient_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let weight = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(sanitize_weight(weight))
}
