//! Gear & Go - manage a gear closet, check pack weight and trip weather
//!
//! A command-line front end that keeps working offline: the closet and the
//! last forecast per location live on disk, and the app shell can be served
//! from a versioned cache when the network is down.

use std::io;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gearngo::app::App;
use gearngo::cli::Cli;
use gearngo::config::{Config, WEATHER_KEY_ENV};

/// Sets up logging to stderr, filtered by `RUST_LOG` (default `warn`)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?.with_env_key(std::env::var(WEATHER_KEY_ENV).ok()),
        None => Config::load()?,
    };

    let app = App::from_config(config)?;
    app.run(cli.command, &mut io::stdout()).await?;

    Ok(())
}
