//! Configuration loaded from environment variables (spec §6).
//!
//! Two roles load distinct subsets: [`Config::refresh_from_env`] for a
//! single provider's cache-refresh run, [`Config::feed_build_from_env`] for
//! the feed-build run. Both share the typed env helpers below, which fall
//! back to the documented default and log a warning — without ever logging
//! the raw value — on a malformed entry.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CommonError, Result};
use crate::path_guard::guard_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: Option<PathBuf>,
    pub max_bytes: u64,
    pub backup_count: u32,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct FeedShapeConfig {
    pub out_path: PathBuf,
    pub title: String,
    pub link: String,
    pub description: String,
    pub ttl_minutes: u32,
    pub description_char_limit: usize,
    pub max_items: usize,
    pub fresh_pubdate_window_min: i64,
    pub max_item_age_days: i64,
    pub absolute_max_age_days: i64,
    pub ends_at_grace_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub provider_timeout: Duration,
    pub provider_max_workers: usize,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub state_path: PathBuf,
    pub retention_days: i64,
}

/// Configuration shared by both execution modes, plus the role-specific
/// pieces each one actually uses (mirroring `rootsignal_common::Config`'s
/// per-role constructors, which load only the fields their role needs).
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub logging: LoggingConfig,
    pub feed_shape: Option<FeedShapeConfig>,
    pub runtime: RuntimeConfig,
    pub state: Option<StateConfig>,
}

impl Config {
    /// Load configuration for a cache-refresh run: logging + runtime only.
    /// Provider-specific credentials and endpoints are loaded by the
    /// provider adapter itself (spec §4.2), not here.
    pub fn refresh_from_env() -> Result<Self> {
        let base_dir = base_dir_from_env();
        Ok(Self {
            logging: logging_from_env(&base_dir)?,
            feed_shape: None,
            runtime: runtime_from_env(),
            state: None,
            base_dir,
        })
    }

    /// Load configuration for a feed-build run: logging, feed shape,
    /// runtime and state.
    pub fn feed_build_from_env() -> Result<Self> {
        let base_dir = base_dir_from_env();
        Ok(Self {
            feed_shape: Some(feed_shape_from_env(&base_dir)?),
            state: Some(state_from_env(&base_dir)?),
            logging: logging_from_env(&base_dir)?,
            runtime: runtime_from_env(),
            base_dir,
        })
    }

    /// Log a line per recognised group without ever including a raw
    /// credential or path value (mirrors
    /// `rootsignal_common::Config::log_redacted`).
    pub fn log_redacted(&self) {
        tracing::info!(
            log_level = %self.logging.level,
            log_format = ?self.logging.format,
            provider_timeout_secs = self.runtime.provider_timeout.as_secs(),
            provider_max_workers = self.runtime.provider_max_workers,
            "configuration loaded"
        );
    }
}

fn base_dir_from_env() -> PathBuf {
    env::var("TRANSIT_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn logging_from_env(base_dir: &std::path::Path) -> Result<LoggingConfig> {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let dir = match env::var("LOG_DIR") {
        Ok(raw) if !raw.is_empty() => Some(guard_path(base_dir, std::path::Path::new(&raw))?.parent().unwrap_or(base_dir).to_path_buf()),
        _ => None,
    };
    let max_bytes = parse_env_u64("LOG_MAX_BYTES", 10 * 1024 * 1024);
    let backup_count = parse_env_u32("LOG_BACKUP_COUNT", 5);
    let format = match env::var("LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("text") | Err(_) => LogFormat::Text,
        Ok(other) => {
            tracing::warn!(value = other, "invalid LOG_FORMAT, falling back to text");
            LogFormat::Text
        }
    };
    Ok(LoggingConfig { level, dir, max_bytes, backup_count, format })
}

fn feed_shape_from_env(base_dir: &std::path::Path) -> Result<FeedShapeConfig> {
    let out_path_raw = env::var("OUT_PATH").unwrap_or_else(|_| "docs/feed.xml".to_string());
    let out_path = guard_path(base_dir, std::path::Path::new(&out_path_raw))?;

    Ok(FeedShapeConfig {
        out_path,
        title: env::var("FEED_TITLE").unwrap_or_else(|_| "Wien Transit Disruptions".to_string()),
        link: env::var("FEED_LINK").unwrap_or_else(|_| "https://example.org/feed".to_string()),
        description: env::var("FEED_DESC")
            .unwrap_or_else(|_| "Aggregated Vienna public-transport disruptions".to_string()),
        ttl_minutes: parse_env_u32("FEED_TTL", 30),
        description_char_limit: parse_env_u64("DESCRIPTION_CHAR_LIMIT", 170) as usize,
        max_items: parse_env_u64("MAX_ITEMS", 30) as usize,
        fresh_pubdate_window_min: parse_env_i64("FRESH_PUBDATE_WINDOW_MIN", 5),
        max_item_age_days: parse_env_i64("MAX_ITEM_AGE_DAYS", 365),
        absolute_max_age_days: parse_env_i64("ABSOLUTE_MAX_AGE_DAYS", 540),
        ends_at_grace_minutes: parse_env_i64("ENDS_AT_GRACE_MINUTES", 10),
    })
}

fn runtime_from_env() -> RuntimeConfig {
    RuntimeConfig {
        provider_timeout: Duration::from_secs(parse_env_u64("PROVIDER_TIMEOUT", 25)),
        provider_max_workers: parse_env_u64("PROVIDER_MAX_WORKERS", num_cpus_fallback() as u64) as usize,
    }
}

fn state_from_env(base_dir: &std::path::Path) -> Result<StateConfig> {
    let state_path_raw = env::var("STATE_PATH").unwrap_or_else(|_| "data/first_seen.json".to_string());
    let state_path = guard_path(base_dir, std::path::Path::new(&state_path_raw))?;
    Ok(StateConfig {
        state_path,
        retention_days: parse_env_i64("STATE_RETENTION_DAYS", 540),
    })
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Parse an integer env var, falling back to `default` and logging a
/// warning (never the raw value) when the variable is set but malformed.
pub fn parse_env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, "invalid integer value, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

pub fn parse_env_u32(key: &str, default: u32) -> u32 {
    parse_env_u64(key, u64::from(default)) as u32
}

pub fn parse_env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, "invalid integer value, using default {default}");
            default
        }),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`"true"`/`"false"`, case-insensitive, also
/// accepts `"1"`/`"0"`), falling back to `default` on anything else.
pub fn parse_env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => {
                tracing::warn!(key, "invalid boolean value, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

/// Required string env var; returns a `ConfigError`-style message rather
/// than panicking, since a missing credential for an enabled provider
/// must be a reported `ConfigError`, not a process abort mid-refresh.
pub fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| CommonError::Config(format!("{key} environment variable is required")))
}
