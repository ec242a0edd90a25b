//! Application wiring and command execution for Gear & Go
//!
//! `App` owns the gear store, the weather cache, the catalog client and the
//! optional app-shell manager, and runs one parsed `Command` against them,
//! writing human-readable output to any `io::Write`.

use std::io::Write;
use std::sync::Arc;

use crate::cache::RemoteDataCache;
use crate::cli::{CatalogCommand, CliError, Command, ShellCommand};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::data::{CatalogClient, WeatherClient, WeatherFetcher, WeatherPayload};
use crate::gear::{
    packed_subset, suggest, GearId, GearItem, GearStore, NewGear, WeightSummary,
};
use crate::shell::{
    AssetCacheManager, AssetRequest, DiskCacheStorage, HttpAssetFetcher, ShellError,
    ShellWorker,
};
use crate::storage::{FileStorage, StorageBackend};

/// Main application struct wiring the library together
pub struct App {
    config: Config,
    store: GearStore,
    weather: RemoteDataCache,
    catalog: CatalogClient,
    /// Present only when a shell origin is configured
    shell: Option<Arc<AssetCacheManager>>,
}

impl App {
    /// Builds the app from configuration with on-disk storage and live clients
    pub fn from_config(config: Config) -> Result<Self, CliError> {
        let storage = match &config.data_dir {
            Some(dir) => FileStorage::with_dir(dir.clone()),
            None => FileStorage::new().ok_or(CliError::NoDataDir)?,
        };
        let weather = WeatherClient::new(config.weather_api_key.clone())
            .with_base_url(config.weather_base_url.clone());
        let catalog = CatalogClient::with_base_url(config.catalog_base_url.clone());

        let shell = match &config.shell.origin {
            Some(origin) => {
                let cache_storage = match &config.shell.cache_dir {
                    Some(dir) => DiskCacheStorage::with_dir(dir.clone()),
                    None => DiskCacheStorage::new().ok_or(CliError::NoDataDir)?,
                };
                Some(Arc::new(AssetCacheManager::new(
                    config.shell.version.clone(),
                    config.shell.manifest.clone(),
                    Arc::new(HttpAssetFetcher::new(origin.clone())),
                    Arc::new(cache_storage),
                )))
            }
            None => None,
        };

        let app = Self::with_parts(
            config,
            Arc::new(storage),
            Arc::new(SystemClock),
            Arc::new(weather),
            catalog,
        );
        Ok(match shell {
            Some(manager) => app.with_shell(manager),
            None => app,
        })
    }

    /// Builds the app from explicit collaborators
    pub fn with_parts(
        config: Config,
        backend: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        weather: Arc<dyn WeatherFetcher>,
        catalog: CatalogClient,
    ) -> Self {
        Self {
            store: GearStore::new(backend.clone(), clock.clone()),
            weather: RemoteDataCache::new(backend, clock, weather),
            config,
            catalog,
            shell: None,
        }
    }

    /// Attaches an app-shell manager for the `shell` commands
    pub fn with_shell(mut self, manager: Arc<AssetCacheManager>) -> Self {
        self.shell = Some(manager);
        self
    }

    pub fn store(&self) -> &GearStore {
        &self.store
    }

    /// Runs a single command
    pub async fn run<W: Write>(&self, command: Command, out: &mut W) -> Result<(), CliError> {
        match command {
            Command::List { packed } => self.list(packed, out),
            Command::Add {
                name,
                brand,
                category,
                weight,
                condition,
                packed,
            } => {
                let item = self.store.create(NewGear {
                    name,
                    brand,
                    category,
                    weight,
                    packed,
                    condition,
                    source: None,
                })?;
                writeln!(out, "Added {}: {}", item.id, item.name)?;
                Ok(())
            }
            Command::Remove { id } => {
                if !self.store.remove(id)? {
                    return Err(CliError::NotFound(id));
                }
                writeln!(out, "Removed {}", id)?;
                Ok(())
            }
            Command::Pack { id } => self.set_packed(id, true, out),
            Command::Unpack { id } => self.set_packed(id, false, out),
            Command::Status { trip, limit } => self.status(trip, limit, out),
            Command::Weather { location, offline } => {
                self.show_weather(location, offline, out).await
            }
            Command::Catalog { command } => self.run_catalog(command, out).await,
            Command::Shell { command } => self.run_shell(command, out).await,
            Command::Clear => {
                self.store.clear()?;
                writeln!(out, "Closet cleared")?;
                Ok(())
            }
        }
    }

    fn list<W: Write>(&self, packed_only: bool, out: &mut W) -> Result<(), CliError> {
        let items = self.store.list();
        let items = if packed_only {
            packed_subset(&items)
        } else {
            items
        };

        if items.is_empty() {
            writeln!(out, "No gear yet")?;
            return Ok(());
        }
        for item in &items {
            writeln!(out, "{}", format_item(item))?;
        }
        Ok(())
    }

    fn set_packed<W: Write>(&self, id: GearId, packed: bool, out: &mut W) -> Result<(), CliError> {
        let item = self
            .store
            .set_packed(id, packed)?
            .ok_or(CliError::NotFound(id))?;
        let verb = if packed { "Packed" } else { "Unpacked" };
        writeln!(out, "{} {}: {}", verb, item.id, item.name)?;
        Ok(())
    }

    fn status<W: Write>(
        &self,
        trip: bool,
        limit: Option<f64>,
        out: &mut W,
    ) -> Result<(), CliError> {
        let items = self.store.list();
        let limit = limit.unwrap_or(self.config.weight_limit_grams);
        let summary = if trip {
            WeightSummary::for_trip(&items, limit)
        } else {
            WeightSummary::from_items(&items, limit)
        };

        writeln!(
            out,
            "{} items: {} of {} ({}%)",
            summary.item_count,
            grams(summary.total),
            grams(summary.limit),
            summary.percent
        )?;
        writeln!(out, "{}", summary.tier.label())?;
        for category in &summary.categories {
            writeln!(
                out,
                "  {:<16} {:>10} {:>4}%",
                category.category,
                grams(category.weight),
                category.percent_of_limit
            )?;
        }
        Ok(())
    }

    /// Shows weather, falling back to a stale cached forecast when offline
    async fn show_weather<W: Write>(
        &self,
        location: Option<String>,
        offline: bool,
        out: &mut W,
    ) -> Result<(), CliError> {
        let location = location
            .or_else(|| self.config.default_location.clone())
            .ok_or(CliError::MissingLocation)?;

        if !offline {
            if let Some(payload) = self.weather.get(&location).await {
                return print_weather(out, &location, &payload, None);
            }
        }

        match self.weather.peek(&location) {
            Some(cached) => {
                let age = cached.age_display();
                print_weather(out, &location, &cached.payload, Some(&age))
            }
            None => Err(CliError::WeatherUnavailable(location)),
        }
    }

    async fn run_catalog<W: Write>(
        &self,
        command: CatalogCommand,
        out: &mut W,
    ) -> Result<(), CliError> {
        match command {
            CatalogCommand::Search { category } => {
                let products = self.catalog.search(&category).await?;
                if products.is_empty() {
                    writeln!(out, "No products in '{}'", category)?;
                }
                for product in &products {
                    writeln!(
                        out,
                        "{:<8} {} ({})  {}",
                        product.id,
                        product.name,
                        product.brand,
                        grams(product.weight)
                    )?;
                }
            }
            CatalogCommand::Import { id } => {
                let product = self.catalog.find_by_id(&id).await?;
                let item = self.store.create(NewGear::from(product))?;
                writeln!(out, "Imported {}: {}", item.id, item.name)?;
            }
        }
        Ok(())
    }

    async fn run_shell<W: Write>(
        &self,
        command: ShellCommand,
        out: &mut W,
    ) -> Result<(), CliError> {
        let manager = self.shell.clone().ok_or(CliError::NoShellOrigin)?;

        match command {
            ShellCommand::Install => {
                let worker = ShellWorker::spawn(manager.clone());
                let result = worker.install().await;
                worker.shutdown().await;
                let count = result?;
                writeln!(out, "Installed {} assets into {}", count, manager.version())?;
            }
            ShellCommand::Activate => {
                let worker = ShellWorker::spawn(manager.clone());
                let result = worker.activate().await;
                worker.shutdown().await;
                for name in result? {
                    writeln!(out, "Deleted {}", name)?;
                }
                writeln!(out, "Activated {}", manager.version())?;
            }
            ShellCommand::Fetch { path } => {
                manager.resume().await?;
                let worker = ShellWorker::spawn(manager);
                let served = worker.fetch(AssetRequest::get(path.as_str())).await;
                worker.shutdown().await;
                match served.response() {
                    Some(response) => writeln!(
                        out,
                        "{}: {} from {} ({} bytes)",
                        path,
                        response.status,
                        served.source(),
                        response.body.len()
                    )?,
                    None => writeln!(out, "{}: unavailable", path)?,
                }
            }
            ShellCommand::Caches => {
                let storage = manager.storage();
                let names = storage.keys().await.map_err(ShellError::from)?;
                if names.is_empty() {
                    writeln!(out, "No caches")?;
                }
                for name in names {
                    let entries = storage
                        .entries(&name)
                        .await
                        .map_err(ShellError::from)?;
                    let marker = if name == manager.version() { "*" } else { " " };
                    writeln!(out, "{} {} ({} entries)", marker, name, entries.len())?;
                }
            }
        }
        Ok(())
    }
}

/// Formats grams without a trailing ".0"
fn grams(weight: f64) -> String {
    format!("{} g", weight)
}

fn format_item(item: &GearItem) -> String {
    let mark = if item.packed { "x" } else { " " };
    let name = if item.brand.is_empty() {
        item.name.clone()
    } else {
        format!("{} ({})", item.name, item.brand)
    };
    format!(
        "[{}] {}  {}  {}  {}",
        mark,
        item.id,
        name,
        item.category_name(),
        grams(item.weight)
    )
}

fn print_weather<W: Write>(
    out: &mut W,
    location: &str,
    payload: &WeatherPayload,
    cached_age: Option<&str>,
) -> Result<(), CliError> {
    write!(
        out,
        "{}: {}°C, {}, {}% chance of precipitation",
        location, payload.temp, payload.conditions, payload.precip_prob
    )?;
    match cached_age {
        Some(age) => writeln!(out, " (cached {})", age)?,
        None => writeln!(out)?,
    }
    if let Some(description) = &payload.description {
        writeln!(out, "{}", description)?;
    }

    let suggestions = suggest(payload);
    if suggestions.is_empty() {
        writeln!(out, "No extra gear suggested")?;
    } else {
        writeln!(out, "Suggested gear:")?;
        for suggestion in suggestions {
            writeln!(out, "  - {}", suggestion.label())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::WeatherError;
    use crate::shell::{AssetFetcher, AssetResponse, CacheStorage, FetchError, MemoryCacheStorage};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Rainy, cold weather that fails on demand
    #[derive(Default)]
    struct RainyWeather {
        fail: AtomicBool,
    }

    #[async_trait]
    impl WeatherFetcher for RainyWeather {
        async fn fetch_weather(&self, _location: &str) -> Result<WeatherPayload, WeatherError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(WeatherError::MissingApiKey);
            }
            Ok(WeatherPayload {
                temp: 6.5,
                conditions: "Rain, Wind".to_string(),
                precip_prob: 80.0,
                description: Some("Wet week ahead.".to_string()),
                days: None,
            })
        }
    }

    struct ShellNetwork {
        online: AtomicBool,
    }

    #[async_trait]
    impl AssetFetcher for ShellNetwork {
        async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(FetchError::Unreachable(request.path.clone()));
            }
            Ok(AssetResponse::ok("text/html", format!("page {}", request.path)))
        }
    }

    struct Fixture {
        app: App,
        clock: Arc<ManualClock>,
        weather: Arc<RainyWeather>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::at_millis(1_767_225_600_000));
        let weather = Arc::new(RainyWeather::default());
        let app = App::with_parts(
            Config::default(),
            Arc::new(MemoryStorage::new()),
            clock.clone(),
            weather.clone(),
            CatalogClient::with_base_url("http://127.0.0.1:9/"),
        );
        Fixture {
            app,
            clock,
            weather,
        }
    }

    async fn run(app: &App, command: Command) -> Result<String, CliError> {
        let mut out = Vec::new();
        app.run(command, &mut out).await?;
        Ok(String::from_utf8(out).expect("utf8 output"))
    }

    fn add(name: &str, category: Option<&str>, weight: f64) -> Command {
        Command::Add {
            name: name.to_string(),
            brand: String::new(),
            category: category.map(str::to_string),
            weight,
            condition: String::new(),
            packed: false,
        }
    }

    #[tokio::test]
    async fn test_add_list_and_status() {
        let f = fixture();
        run(&f.app, add("Tent", Some("Tents"), 2000.0)).await.expect("add tent");
        run(&f.app, add("Stove", None, 500.0)).await.expect("add stove");

        let listing = run(&f.app, Command::List { packed: false }).await.expect("list");
        assert!(listing.contains("Tent  Tents  2000 g"));
        assert!(listing.contains("Stove  Other  500 g"));

        let status = run(&f.app, Command::Status { trip: false, limit: None })
            .await
            .expect("status");
        assert!(status.starts_with("2 items: 2500 g of 5000 g (50%)"));
        assert!(status.contains("SUCCESS: LIGHT"));
        assert!(status.contains("Tents"));
    }

    #[tokio::test]
    async fn test_pack_and_trip_status() {
        let f = fixture();
        run(&f.app, add("Tent", Some("Tents"), 4500.0)).await.expect("add");
        run(&f.app, add("Chair", None, 1000.0)).await.expect("add");
        let tent = f.app.store().list()[0].id;

        let output = run(&f.app, Command::Pack { id: tent }).await.expect("pack");
        assert_eq!(output, format!("Packed {}: Tent\n", tent));

        let status = run(&f.app, Command::Status { trip: true, limit: None })
            .await
            .expect("status");
        assert!(status.starts_with("1 items: 4500 g of 5000 g (90%)"));
        assert!(status.contains("DANGER: HEAVY"));

        let packed = run(&f.app, Command::List { packed: true }).await.expect("list");
        assert!(packed.contains("[x]"));
        assert!(!packed.contains("Chair"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let f = fixture();

        let err = run(&f.app, Command::Remove { id: GearId(7) })
            .await
            .expect_err("nothing to remove");
        assert!(matches!(err, CliError::NotFound(GearId(7))));

        let err = run(&f.app, Command::Unpack { id: GearId(7) })
            .await
            .expect_err("nothing to unpack");
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_closet_and_clear() {
        let f = fixture();
        run(&f.app, add("Tent", None, 1.0)).await.expect("add");

        run(&f.app, Command::Clear).await.expect("clear");

        let listing = run(&f.app, Command::List { packed: false }).await.expect("list");
        assert_eq!(listing, "No gear yet\n");
    }

    #[tokio::test]
    async fn test_weather_prints_suggestions() {
        let f = fixture();

        let output = run(
            &f.app,
            Command::Weather {
                location: Some("Bogota".to_string()),
                offline: false,
            },
        )
        .await
        .expect("weather");

        assert!(output.starts_with("Bogota: 6.5°C, Rain, Wind, 80% chance of precipitation\n"));
        assert!(output.contains("Wet week ahead."));
        assert!(output.contains("Rain Jacket"));
        assert!(output.contains("Insulated Down Jacket"));
        assert!(output.contains("Windbreaker"));
    }

    #[tokio::test]
    async fn test_weather_falls_back_to_stale_cache() {
        let f = fixture();
        let weather = |offline| Command::Weather {
            location: Some("Bogota".to_string()),
            offline,
        };
        run(&f.app, weather(false)).await.expect("first lookup");

        f.clock.advance(Duration::hours(2));
        f.weather.fail.store(true, Ordering::SeqCst);

        let output = run(&f.app, weather(false)).await.expect("stale lookup");
        assert!(output.contains("(cached 2h ago)"));

        let output = run(&f.app, weather(true)).await.expect("offline lookup");
        assert!(output.contains("(cached 2h ago)"));
    }

    #[tokio::test]
    async fn test_weather_errors() {
        let f = fixture();

        let err = run(
            &f.app,
            Command::Weather {
                location: None,
                offline: false,
            },
        )
        .await
        .expect_err("no location");
        assert!(matches!(err, CliError::MissingLocation));

        f.weather.fail.store(true, Ordering::SeqCst);
        let err = run(
            &f.app,
            Command::Weather {
                location: Some("Lima".to_string()),
                offline: false,
            },
        )
        .await
        .expect_err("nothing cached");
        assert!(matches!(err, CliError::WeatherUnavailable(location) if location == "Lima"));
    }

    #[tokio::test]
    async fn test_shell_commands_need_origin() {
        let f = fixture();

        let err = run(
            &f.app,
            Command::Shell {
                command: ShellCommand::Caches,
            },
        )
        .await
        .expect_err("no shell");

        assert!(matches!(err, CliError::NoShellOrigin));
    }

    #[tokio::test]
    async fn test_shell_lifecycle_and_offline_fetch() {
        let network = Arc::new(ShellNetwork {
            online: AtomicBool::new(true),
        });
        let storage = Arc::new(MemoryCacheStorage::new());
        storage
            .put("gear-n-go-v0", "./", &AssetResponse::ok("text/html", "old"))
            .await
            .expect("seed old cache");
        let manager = Arc::new(AssetCacheManager::new(
            "gear-n-go-v1",
            vec!["./".to_string(), "./index.html".to_string()],
            network.clone(),
            storage.clone(),
        ));
        let app = fixture().app.with_shell(manager);
        let shell = |command| Command::Shell { command };

        let output = run(&app, shell(ShellCommand::Install)).await.expect("install");
        assert_eq!(output, "Installed 2 assets into gear-n-go-v1\n");

        let output = run(&app, shell(ShellCommand::Activate)).await.expect("activate");
        assert_eq!(output, "Deleted gear-n-go-v0\nActivated gear-n-go-v1\n");

        network.online.store(false, Ordering::SeqCst);
        let output = run(
            &app,
            shell(ShellCommand::Fetch {
                path: "./index.html".to_string(),
            }),
        )
        .await
        .expect("fetch");
        assert_eq!(output, "./index.html: 200 from cache (17 bytes)\n");

        let output = run(&app, shell(ShellCommand::Caches)).await.expect("caches");
        assert_eq!(output, "* gear-n-go-v1 (2 entries)\n");
    }

    #[test]
    fn test_format_item() {
        let item = GearItem {
            id: GearId(42),
            name: "Ajax Tent".to_string(),
            brand: "Marmot".to_string(),
            category: None,
            weight: 2130.5,
            packed: true,
            condition: String::new(),
            added_at: None,
            source: None,
        };
        assert_eq!(format_item(&item), "[x] 42  Ajax Tent (Marmot)  Other  2130.5 g");
    }
}
