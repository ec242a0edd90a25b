//! Command-line interface parsing for Gear & Go
//!
//! This module defines the `gearngo` subcommands with clap and the argument
//! parsers that turn raw strings into gear ids and weights.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::CatalogError;
use crate::gear::GearId;
use crate::shell::ShellError;
use crate::storage::StorageError;

/// Error types for the command-line front end
#[derive(Debug, Error)]
pub enum CliError {
    /// The id argument is not a non-negative integer
    #[error("Invalid gear id: '{0}'")]
    InvalidId(String),

    /// The weight argument is not a non-negative number of grams
    #[error("Invalid weight: '{0}'. Expected a non-negative number of grams")]
    InvalidWeight(String),

    /// No item has the given id
    #[error("No gear with id {0}")]
    NotFound(GearId),

    /// No location given and none configured
    #[error("No location given and no default_location configured")]
    MissingLocation,

    /// Neither the network nor the cache had weather for the location
    #[error("Weather for '{0}' is unavailable and nothing is cached")]
    WeatherUnavailable(String),

    /// The data directory could not be determined
    #[error("Could not determine a data directory; set data_dir in the config")]
    NoDataDir,

    /// App-shell commands need an origin to fetch from
    #[error("No shell origin configured; set shell.origin in the config")]
    NoShellOrigin,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Gear & Go - pack smarter, even offline
#[derive(Parser, Debug)]
#[command(name = "gearngo")]
#[command(about = "Gear closet, pack weight and trip weather, usable offline")]
#[command(version)]
pub struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List the gear in the closet
    List {
        /// Only show packed items
        #[arg(long)]
        packed: bool,
    },

    /// Add a piece of gear
    ///
    /// Examples:
    ///   gearngo add "Ajax Tent" --brand Marmot --category Tents --weight 2130
    ///   gearngo add Headlamp --weight 90 --packed
    Add {
        /// Item name
        name: String,
        #[arg(long, default_value = "")]
        brand: String,
        /// Category; items without one are grouped under "Other"
        #[arg(long)]
        category: Option<String>,
        /// Weight in grams
        #[arg(long, default_value = "0", value_parser = parse_weight_arg)]
        weight: f64,
        #[arg(long, default_value = "")]
        condition: String,
        /// Mark the item packed right away
        #[arg(long)]
        packed: bool,
    },

    /// Remove gear by id
    Remove {
        #[arg(value_parser = parse_id_arg)]
        id: GearId,
    },

    /// Mark gear as packed
    Pack {
        #[arg(value_parser = parse_id_arg)]
        id: GearId,
    },

    /// Mark gear as not packed
    Unpack {
        #[arg(value_parser = parse_id_arg)]
        id: GearId,
    },

    /// Show total weight against the limit, by category
    Status {
        /// Only count packed items
        #[arg(long)]
        trip: bool,
        /// Weight limit in grams (defaults to the configured limit)
        #[arg(long, value_parser = parse_weight_arg)]
        limit: Option<f64>,
    },

    /// Show the forecast for a location with packing suggestions
    ///
    /// Examples:
    ///   gearngo weather Bogota
    ///   gearngo weather 40.7128,-74.0060 --offline
    Weather {
        /// Place name or "lat,lon" (defaults to the configured location)
        location: Option<String>,
        /// Only use the cached forecast, even if it is stale
        #[arg(long)]
        offline: bool,
    },

    /// Search and import from the product catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },

    /// Manage the offline app-shell cache
    Shell {
        #[command(subcommand)]
        command: ShellCommand,
    },

    /// Remove every item from the closet
    Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CatalogCommand {
    /// List catalog products in a category
    Search { category: String },
    /// Copy a catalog product into the closet
    Import { id: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Cache every manifest asset under the current version
    Install,
    /// Delete caches of older versions
    Activate,
    /// Fetch a path through the cache (network first)
    Fetch { path: String },
    /// List caches and their entries
    Caches,
}

/// Parses a gear id argument; surrounding whitespace is ignored.
pub fn parse_id_arg(s: &str) -> Result<GearId, CliError> {
    s.parse().map_err(|_| CliError::InvalidId(s.to_string()))
}

/// Parses a weight in grams, rejecting negative and non-finite values.
pub fn parse_weight_arg(s: &str) -> Result<f64, CliError> {
    match s.trim().parse::<f64>() {
        Ok(weight) if weight.is_finite() && weight >= 0.0 => Ok(weight),
        _ => Err(CliError::InvalidWeight(s.to_string())),
    }
}
