//! `transit-refresh`: a short-lived batch job that polls one configured
//! provider and writes its cache file (spec §5: "each refresh process is a
//! short-lived batch job; no long-running daemon").

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use transit_cache::{CacheStore, RateLimitCounter};
use transit_common::{Config, Event, ProviderTag};
use transit_providers::{
    MunicipalProvider, NationalRailwayProvider, ProviderError, RegionalAuthorityConfig, RegionalAuthorityProvider,
};
use transit_stations::StationCatalogue;

#[derive(Parser)]
#[command(name = "transit-refresh")]
struct Cli {
    #[arg(long, value_enum)]
    provider: ProviderKind,
}

#[derive(Copy, Clone, ValueEnum)]
enum ProviderKind {
    Municipal,
    NationalRailway,
    RegionalAuthority,
}

impl ProviderKind {
    fn label(self) -> &'static str {
        match self {
            ProviderKind::Municipal => "municipal",
            ProviderKind::NationalRailway => "national_railway",
            ProviderKind::RegionalAuthority => "regional_authority",
        }
    }

    fn tag(self) -> ProviderTag {
        match self {
            ProviderKind::Municipal => ProviderTag::Municipal,
            ProviderKind::NationalRailway => ProviderTag::NationalRailway,
            ProviderKind::RegionalAuthority => ProviderTag::RegionalAuthority,
        }
    }

    fn cache_path(self) -> String {
        self.tag().cache_path_from_env()
    }
}

enum RunError {
    Config(String),
    Io(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match Config::refresh_from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    let _guard = transit_cli::logging::init(&config.logging);
    config.log_redacted();

    match run(cli.provider, &config).await {
        Ok(()) => ExitCode::from(0),
        Err(RunError::Config(msg)) => {
            error!(error = %msg, "configuration error");
            ExitCode::from(1)
        }
        Err(RunError::Io(msg)) => {
            error!(error = %msg, "persistent I/O failure");
            ExitCode::from(3)
        }
    }
}

async fn run(provider: ProviderKind, config: &Config) -> Result<(), RunError> {
    if !provider.tag().is_enabled_from_env() {
        warn!(provider = provider.label(), "provider disabled; cache left untouched");
        return Ok(());
    }

    let events = match provider {
        ProviderKind::Municipal => {
            let adapter = MunicipalProvider::from_env().map_err(|e| RunError::Config(e.to_string()))?;
            fetch_with_deadline(adapter.fetch(), config.runtime.provider_timeout).await
        }
        ProviderKind::NationalRailway => {
            let stations_path = std::env::var("STATIONS_PATH").unwrap_or_else(|_| "data/stations.json".to_string());
            let catalogue = StationCatalogue::load(&config.base_dir, Path::new(&stations_path))
                .map_err(|e| RunError::Config(e.to_string()))?;
            let adapter =
                NationalRailwayProvider::from_env(&catalogue).map_err(|e| RunError::Config(e.to_string()))?;
            fetch_with_deadline(adapter.fetch(), config.runtime.provider_timeout).await
        }
        ProviderKind::RegionalAuthority => {
            let cfg = RegionalAuthorityConfig::from_env().map_err(|e| RunError::Config(e.to_string()))?;
            let counter_path = std::env::var("REGIONAL_AUTHORITY_COUNTER_PATH")
                .unwrap_or_else(|_| "data/regional_authority_rate_limit.json".to_string());
            let counter = RateLimitCounter::new(&config.base_dir, Path::new(&counter_path))
                .map_err(|e| RunError::Config(e.to_string()))?;
            let adapter = RegionalAuthorityProvider::new(cfg, counter);

            match adapter.fetch(chrono::Utc::now()).await {
                Ok(events) => events,
                Err(ProviderError::BudgetExceeded) | Err(ProviderError::CircuitBroken) => {
                    warn!("regional-authority provider refused to run this cycle; cache left untouched");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "regional-authority provider refresh failed");
                    Vec::new()
                }
            }
        }
    };

    info!(provider = provider.label(), events = events.len(), "fetched events");

    let store = CacheStore::new(&config.base_dir, Path::new(&provider.cache_path()))
        .map_err(|e| RunError::Config(e.to_string()))?;
    store.write(&events).map_err(|e| RunError::Io(e.to_string()))?;

    Ok(())
}

/// Apply the single per-provider deadline (spec §5); on timeout the partial
/// result is discarded and a warning logged, never surfaced as an error.
async fn fetch_with_deadline<F>(fut: F, timeout: Duration) -> Vec<Event>
where
    F: std::future::Future<Output = Result<Vec<Event>, ProviderError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => {
            warn!(error = %e, "provider fetch failed");
            Vec::new()
        }
        Err(_) => {
            warn!("provider fetch exceeded deadline");
            Vec::new()
        }
    }
}
