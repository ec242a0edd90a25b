//! Weather-driven packing suggestions
//!
//! Maps a forecast onto a short list of gear to bring. Rules are evaluated in
//! a fixed order, and each one fires at most once.

use crate::data::WeatherPayload;

/// Precipitation probability (percent) above which rain gear is suggested
const RAIN_PROBABILITY_THRESHOLD: f64 = 30.0;

/// Temperature (Celsius) below which insulation is suggested
const COLD_TEMP_THRESHOLD: f64 = 10.0;

/// Temperature (Celsius) above which extra water is suggested
const HOT_TEMP_THRESHOLD: f64 = 25.0;

/// A piece of gear worth packing for the forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suggestion {
    /// High chance of rain
    RainJacket,
    /// Cold weather forecast
    InsulatedJacket,
    /// High heat warning
    ExtraWater,
    /// Breezy conditions
    Windbreaker,
}

impl Suggestion {
    /// Returns a human-readable label including the reason
    pub fn label(&self) -> &'static str {
        match self {
            Suggestion::RainJacket => "Rain Jacket (High chance of rain)",
            Suggestion::InsulatedJacket => "Insulated Down Jacket (Cold weather forecast)",
            Suggestion::ExtraWater => "Extra Water Bottle (High heat warning)",
            Suggestion::Windbreaker => "Windbreaker (Breezy conditions)",
        }
    }
}

/// Returns the gear suggested for `weather`
pub fn suggest(weather: &WeatherPayload) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    if weather.precip_prob > RAIN_PROBABILITY_THRESHOLD {
        suggestions.push(Suggestion::RainJacket);
    }
    if weather.temp < COLD_TEMP_THRESHOLD {
        suggestions.push(Suggestion::InsulatedJacket);
    }
    if weather.temp > HOT_TEMP_THRESHOLD {
        suggestions.push(Suggestion::ExtraWater);
    }
    if weather.conditions.to_lowercase().contains("wind") {
        suggestions.push(Suggestion::Windbreaker);
    }

    suggestions
}
