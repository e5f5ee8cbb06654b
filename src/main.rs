//! Personal Weather - track a few cities and keep their temperatures fresh.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pw_core::{AppError, Config};
use pw_services::{
    build_views, LocationClient, LocationKey, RefreshOrchestrator, SqliteLocationStore,
};
use pw_weather::{GeoLocation, OpenWeatherClient, TemperatureProvider};

#[derive(Parser, Debug)]
#[command(name = "personal-weather")]
#[command(about = "Current temperatures for the places you track")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh stale locations and print all of them
    List,
    /// Look up candidate coordinates for a city
    Search(PlaceArgs),
    /// Track a city, using the Nth search candidate
    Add {
        #[command(flatten)]
        place: PlaceArgs,
        #[arg(long, default_value_t = 0)]
        pick: usize,
    },
    /// Stop tracking a city
    Remove {
        #[arg(required_unless_present = "id")]
        city: Option<String>,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        country: String,
        #[arg(long, conflicts_with = "city")]
        id: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct PlaceArgs {
    city: String,
    #[arg(long, default_value = "")]
    state: String,
    #[arg(long, default_value = "")]
    country: String,
}

impl Command {
    fn removal_key(&self) -> Option<LocationKey> {
        match self {
            Command::Remove { id: Some(id), .. } => Some(LocationKey::Id(*id)),
            Command::Remove {
                city: Some(city),
                state,
                country,
                ..
            } => Some(LocationKey::natural(city.as_str(), state.as_str(), country.as_str())),
            _ => None,
        }
    }
}

struct App {
    config: Config,
    store: LocationClient,
    provider: Arc<OpenWeatherClient>,
}

impl App {
    fn build(config_path: Option<&std::path::Path>) -> Result<Self, AppError> {
        let (config, _warnings) = Config::load_validated(config_path).map_err(config_error)?;

        let store = SqliteLocationStore::open(&config.database.path)?;
        let provider = OpenWeatherClient::from_config(&config.weather)?;
        tracing::debug!(
            database = %config.database.path.display(),
            base_url = %config.weather.base_url,
            "Application wired"
        );

        Ok(Self {
            config,
            store: LocationClient::new(store),
            provider: Arc::new(provider),
        })
    }

    fn orchestrator(&self) -> RefreshOrchestrator {
        RefreshOrchestrator::from_config(
            self.store.clone(),
            self.provider.clone(),
            &self.config,
        )
    }

    async fn list(&self) -> Result<(), AppError> {
        let now = Utc::now();
        let records = self.orchestrator().refresh_and_list(now).await?;
        if records.is_empty() {
            println!("No locations tracked yet. Add one with `personal-weather add <city>`.");
            return Ok(());
        }
        for view in build_views(&records, now) {
            println!("{}", view);
        }
        Ok(())
    }

    async fn search(&self, place: &PlaceArgs) -> Result<Vec<GeoLocation>, AppError> {
        let candidates = self
            .provider
            .get_city_coordinates(&place.city, &place.state, &place.country)
            .await?;
        Ok(candidates)
    }

    async fn print_search(&self, place: &PlaceArgs) -> Result<(), AppError> {
        let candidates = self.search(place).await?;
        if candidates.is_empty() {
            println!("No matches for {}", place.city);
        }
        for (i, c) in candidates.iter().enumerate() {
            println!("{:>2}  {:<40} {:>9.4} {:>10.4}", i, c.display_name(), c.latitude, c.longitude);
        }
        Ok(())
    }

    async fn add(&self, place: &PlaceArgs, pick: usize) -> Result<(), AppError> {
        let candidates = self.search(place).await?;
        let chosen = pick_candidate(candidates, pick)?;

        if self
            .store
            .find_one(&chosen.name, &chosen.state, &chosen.country)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidInput(format!(
                "{} is already tracked",
                chosen.display_name()
            )));
        }

        let id = self
            .store
            .save(&chosen.name, &chosen.state, &chosen.country, chosen.latitude, chosen.longitude)
            .await?;
        println!("Tracking {} (id {})", chosen.display_name(), id);
        Ok(())
    }

    async fn remove(&self, key: LocationKey) -> Result<(), AppError> {
        let label = key.to_string();
        self.store.delete(key).await?;
        println!("Removed {}", label);
        Ok(())
    }
}

fn pick_candidate(candidates: Vec<GeoLocation>, pick: usize) -> Result<GeoLocation, AppError> {
    let total = candidates.len();
    if total == 0 {
        return Err(AppError::NotFound("no matching city".into()));
    }
    candidates.into_iter().nth(pick).ok_or_else(|| {
        AppError::InvalidInput(format!("--pick {} is out of range ({} candidates)", pick, total))
    })
}

/// Keep typed config errors visible through the anyhow edge.
fn config_error(e: anyhow::Error) -> AppError {
    match e.downcast::<pw_core::ConfigError>() {
        Ok(config) => AppError::Config(config),
        Err(other) => AppError::Other(other),
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let app = App::build(cli.config.as_deref())?;

    match &cli.command {
        Command::List => app.list().await,
        Command::Search(place) => app.print_search(place).await,
        Command::Add { place, pick } => app.add(place, *pick).await,
        Command::Remove { .. } => match cli.command.removal_key() {
            Some(key) => app.remove(key).await,
            None => Err(AppError::InvalidInput("nothing to remove".into())),
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = pw_core::init() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn candidate(name: &str) -> GeoLocation {
        GeoLocation {
            name: name.into(),
            state: "Texas".into(),
            country: "US".into(),
            latitude: 30.27,
            longitude: -97.74,
        }
    }

    #[test]
    fn test_parse_add_with_pick() {
        let cli = Cli::try_parse_from([
            "personal-weather", "add", "Austin", "--state", "TX", "--pick", "2",
        ])
        .unwrap();
        match cli.command {
            Command::Add { place, pick } => {
                assert_eq!(place.city, "Austin");
                assert_eq!(place.state, "TX");
                assert_eq!(place.country, "");
                assert_eq!(pick, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_remove_keys() {
        let by_id = Cli::try_parse_from(["personal-weather", "remove", "--id", "4"]).unwrap();
        assert_eq!(by_id.command.removal_key(), Some(LocationKey::Id(4)));

        let by_name = Cli::try_parse_from([
            "personal-weather", "remove", "Austin", "--state", "TX", "--country", "US",
        ])
        .unwrap();
        assert_eq!(
            by_name.command.removal_key(),
            Some(LocationKey::natural("Austin", "TX", "US"))
        );
    }

    #[test]
    fn test_remove_requires_a_target() {
        assert!(Cli::try_parse_from(["personal-weather", "remove"]).is_err());
        assert!(Cli::try_parse_from(["personal-weather", "remove", "Austin", "--id", "1"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["personal-weather", "list", "--config", "/tmp/w.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
    }

    #[test]
    fn test_pick_candidate() {
        let picked = pick_candidate(vec![candidate("Austin"), candidate("Round Rock")], 1).unwrap();
        assert_eq!(picked.name, "Round Rock");

        let err = pick_candidate(vec![candidate("Austin")], 3).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err = pick_candidate(Vec::new(), 0).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_config_error_stays_typed() {
        let e: anyhow::Error = pw_core::ConfigError::Invalid("bad".into()).into();
        assert!(matches!(config_error(e), AppError::Config(_)));
        assert!(matches!(config_error(anyhow::anyhow!("io")), AppError::Other(_)));
    }
}
