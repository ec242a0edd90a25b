//! Weight figures derived from a closet snapshot
//!
//! Everything here is a pure function of its inputs. Callers pass a fresh
//! `GearStore::list()` snapshot each time; nothing is cached between calls.

use std::collections::BTreeMap;

use super::GearItem;

/// Default pack weight limit in grams
pub const DEFAULT_WEIGHT_LIMIT_GRAMS: f64 = 5000.0;

/// Highest percentage still classed as light
const LIGHT_MAX_PERCENT: u32 = 50;

/// Highest percentage still classed as moderate
const MODERATE_MAX_PERCENT: u32 = 80;

/// How heavy a load is relative to the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightTier {
    /// At or below 50% of the limit
    Light,
    /// Above 50% and at or below 80%
    Moderate,
    /// Above 80%
    Heavy,
}

impl WeightTier {
    /// Status label shown next to the weight bar
    pub fn label(&self) -> &'static str {
        match self {
            WeightTier::Light => "SUCCESS: LIGHT",
            WeightTier::Moderate => "WARNING: MODERATE",
            WeightTier::Heavy => "DANGER: HEAVY",
        }
    }
}

/// Sums item weights in grams
pub fn total_weight(items: &[GearItem]) -> f64 {
    items.iter().map(|item| item.weight).sum()
}

/// Sums weight per category, with uncategorized items under "Other"
pub fn category_breakdown(items: &[GearItem]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.category_name().to_string()).or_insert(0.0) += item.weight;
    }
    totals
}

/// Share of `limit` used by `total`, clamped to 0..=100 and rounded
///
/// A non-positive limit counts as fully used as soon as anything weighs more
/// than nothing.
pub fn percent_of_limit(total: f64, limit: f64) -> u32 {
    if limit.is_nan() || limit <= 0.0 {
        return if total > 0.0 { 100 } else { 0 };
    }
    let percent = (total / limit * 100.0).clamp(0.0, 100.0);
    percent.round() as u32
}

/// Classifies a percentage of the limit
pub fn tier(percent: u32) -> WeightTier {
    if percent <= LIGHT_MAX_PERCENT {
        WeightTier::Light
    } else if percent <= MODERATE_MAX_PERCENT {
        WeightTier::Moderate
    } else {
        WeightTier::Heavy
    }
}

/// Items marked as packed for the trip
pub fn packed_subset(items: &[GearItem]) -> Vec<GearItem> {
    items.iter().filter(|item| item.packed).cloned().collect()
}

/// Weight of a single category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryWeight {
    /// Category name
    pub category: String,
    /// Summed weight in grams
    pub weight: f64,
    /// Share of the overall limit, clamped to 0..=100
    pub percent_of_limit: u32,
}

/// Everything the weight panel shows, computed in one pass over a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSummary {
    /// Total weight in grams
    pub total: f64,
    /// Limit the total is measured against
    pub limit: f64,
    /// Rounded, clamped share of the limit
    pub percent: u32,
    /// Classification of `percent`
    pub tier: WeightTier,
    /// Per-category totals, sorted by category name
    pub categories: Vec<CategoryWeight>,
    /// Number of items counted
    pub item_count: usize,
}

impl WeightSummary {
    /// Builds a summary of `items` against `limit`
    pub fn from_items(items: &[GearItem], limit: f64) -> Self {
        let total = total_weight(items);
        let percent = percent_of_limit(total, limit);
        let categories = category_breakdown(items)
            .into_iter()
            .map(|(category, weight)| CategoryWeight {
                percent_of_limit: percent_of_limit(weight, limit),
                category,
                weight,
            })
            .collect();

        Self {
            total,
            limit,
            percent,
            tier: tier(percent),
            categories,
            item_count: items.len(),
        }
    }

    /// Builds a summary of only the packed items
    pub fn for_trip(items: &[GearItem], limit: f64) -> Self {
        Self::from_items(&packed_subset(items), limit)
    }
}
