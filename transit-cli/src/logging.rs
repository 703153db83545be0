//! Shared logging setup for both binaries, grounded in the
//! `tracing_subscriber::fmt()` + `EnvFilter` pattern every `main.rs` in the
//! teacher's workspace uses. `LOG_DIR` routes output through
//! `tracing_appender`'s rolling file writer instead of stdout; byte-size
//! rotation (`LOG_MAX_BYTES`/`LOG_BACKUP_COUNT`) isn't something
//! `tracing-appender` supports directly, so those values are parsed,
//! validated and logged but rotation itself is daily, not size-capped.

use tracing_subscriber::EnvFilter;

use transit_common::config::{LogFormat, LoggingConfig};

/// Returned so the caller can keep the non-blocking writer guard alive for
/// the process lifetime; dropping it early truncates buffered log lines.
pub fn init(logging: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "transit-aggregator.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(non_blocking);
            match logging.format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Text => builder.init(),
            }
            Some(guard)
        }
        None => {
            let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
            match logging.format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Text => builder.init(),
            }
            None
        }
    }
}
