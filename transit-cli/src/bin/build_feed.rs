//! `transit-build-feed`: reads every enabled provider's cache file,
//! aggregates them through the pipeline, and emits the RSS 2.0 feed.

use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use transit_cache::{CacheStore, FirstSeenStore};
use transit_common::{Config, Event, ProviderTag};
use transit_feed::pipeline::{self, ClipConfig, PruneConfig};
use transit_feed::rss::{write_to_file, FeedMeta};

enum RunError {
    Config(String),
    NoData,
    Io(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match Config::feed_build_from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    let _guard = transit_cli::logging::init(&config.logging);
    config.log_redacted();

    match run(&config).await {
        Ok(()) => ExitCode::from(0),
        Err(RunError::Config(msg)) => {
            error!(error = %msg, "configuration error");
            ExitCode::from(1)
        }
        Err(RunError::NoData) => {
            error!("no enabled provider produced any data");
            ExitCode::from(2)
        }
        Err(RunError::Io(msg)) => {
            error!(error = %msg, "persistent I/O failure");
            ExitCode::from(3)
        }
    }
}

/// Cache paths of the providers that are enabled, read through the same
/// `ProviderTag::cache_path_from_env`/`is_enabled_from_env` helpers
/// `transit-refresh` uses, so a custom cache path or a disabled provider
/// never silently diverges between the two binaries.
fn enabled_cache_paths() -> Vec<String> {
    ProviderTag::all()
        .into_iter()
        .filter(|tag| tag.is_enabled_from_env())
        .map(|tag| tag.cache_path_from_env())
        .collect()
}

async fn run(config: &Config) -> Result<(), RunError> {
    let feed_shape = config.feed_shape.as_ref().expect("feed_build_from_env always sets feed_shape");
    let state = config.state.as_ref().expect("feed_build_from_env always sets state");

    let cache_paths = enabled_cache_paths();
    if cache_paths.is_empty() {
        return Err(RunError::NoData);
    }

    let overall_timeout = config.runtime.provider_timeout * (cache_paths.len() as u32) + Duration::seconds(5).to_std().unwrap();
    let collect = collect_all(config, &cache_paths);
    let per_provider = match tokio::time::timeout(overall_timeout, collect).await {
        Ok(results) => results,
        Err(_) => {
            warn!("collect stage exceeded its overall deadline; proceeding with whatever was gathered");
            Vec::new()
        }
    };

    let produced_any = per_provider.iter().any(|events| !events.is_empty());
    if !produced_any {
        return Err(RunError::NoData);
    }

    let events: Vec<Event> = per_provider.into_iter().flatten().collect();
    let now = Utc::now();

    let mut first_seen = FirstSeenStore::load(&config.base_dir, &state.state_path).map_err(|e| RunError::Config(e.to_string()))?;

    let events = pipeline::normalise(events);
    let prune_config = PruneConfig {
        max_item_age_days: feed_shape.max_item_age_days,
        absolute_max_age_days: feed_shape.absolute_max_age_days,
        ends_at_grace_minutes: feed_shape.ends_at_grace_minutes,
    };
    let (events, prune_stats) = pipeline::prune(events, now, &first_seen, &prune_config);
    let (events, dedupe_stats) = pipeline::dedupe(events);
    let events = pipeline::order(events, now, &first_seen, feed_shape.fresh_pubdate_window_min);
    let events = pipeline::clip(events, &ClipConfig { max_items: feed_shape.max_items });

    info!(
        kept = events.len(),
        pruned = prune_stats.dropped,
        dedupe_groups = dedupe_stats.groups,
        dedupe_merged = dedupe_stats.merged,
        "aggregation pipeline complete"
    );

    let emitted_keys: HashSet<String> = events.iter().map(Event::first_seen_key).collect();
    for event in &events {
        first_seen.observe(&event.first_seen_key(), now);
    }
    first_seen.retain_keys(&emitted_keys);

    if let Err(e) = first_seen.persist() {
        warn!(error = %e, "failed to persist first-seen state; build continues");
    }

    let meta = FeedMeta {
        title: feed_shape.title.clone(),
        link: feed_shape.link.clone(),
        description: feed_shape.description.clone(),
        ttl_minutes: feed_shape.ttl_minutes,
    };
    write_to_file(&events, &meta, &first_seen, now, &feed_shape.out_path).map_err(|e| RunError::Io(e.to_string()))?;

    Ok(())
}

/// Read every provider's cache file with bounded concurrency, grounded in
/// the `stream::iter(...).buffer_unordered(N)` fan-out used elsewhere in
/// this codebase for a list of independent, equally-sized async jobs.
async fn collect_all(config: &Config, cache_paths: &[String]) -> Vec<Vec<Event>> {
    let workers = config.runtime.provider_max_workers.max(1).min(cache_paths.len());
    stream::iter(cache_paths.iter())
        .map(|path| read_cache(config, path))
        .buffer_unordered(workers)
        .collect()
        .await
}

async fn read_cache(config: &Config, configured: &str) -> Vec<Event> {
    let store = match CacheStore::new(&config.base_dir, Path::new(configured)) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = configured, error = %e, "could not open cache file");
            return Vec::new();
        }
    };
    match store.read::<Event>() {
        Ok(events) => events,
        Err(e) => {
            warn!(path = configured, error = %e, "could not read cache file");
            Vec::new()
        }
    }
}
