//! Cross-process daily rate-limit counter (spec §4.3): a file-locked
//! `{day, count}` JSON document. The lock is acquired before the counter
//! is read so two concurrent refreshes of the same provider never race on
//! the increment.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use chrono_tz::Europe::Vienna;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use transit_common::path_guard::guard_path;

use crate::atomic_write::{atomic_write, read_optional};
use crate::error::{CacheError, Result};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const STALE_LOCK_AGE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CounterDoc {
    day: NaiveDate,
    count: u32,
}

pub struct RateLimitCounter {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
}

impl RateLimitCounter {
    pub fn new(base_dir: &Path, configured: &Path) -> Result<Self> {
        let path = guard_path(base_dir, configured)?;
        let lock_path = path.with_extension("lock");
        Ok(Self {
            path,
            lock_path,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Acquire the lock, increment today's count, persist, and return the
    /// new count. The increment happens before any HTTP attempt is made,
    /// so denials and timeouts still count against the daily budget.
    pub fn increment(&self) -> Result<u32> {
        let _guard = self.acquire_lock()?;
        let today = Utc::now().with_timezone(&Vienna).date_naive();

        let mut doc = self.read_doc()?.unwrap_or(CounterDoc { day: today, count: 0 });
        if doc.day != today {
            doc = CounterDoc { day: today, count: 0 };
        }
        doc.count += 1;

        let bytes = serde_json::to_vec(&doc)?;
        atomic_write(&self.path, &bytes)?;
        Ok(doc.count)
    }

    /// Read today's count without incrementing, used for pre-flight budget
    /// checks.
    pub fn current_count(&self) -> Result<u32> {
        let today = Utc::now().with_timezone(&Vienna).date_naive();
        match self.read_doc()? {
            Some(doc) if doc.day == today => Ok(doc.count),
            _ => Ok(0),
        }
    }

    fn read_doc(&self) -> Result<Option<CounterDoc>> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "rate-limit counter file unparsable; starting a new day at 0");
                Ok(None)
            }
        }
    }

    fn acquire_lock(&self) -> Result<LockGuard> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| CacheError::Io {
                path: self.lock_path.display().to_string(),
                source: e,
            })?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(LockGuard { file }),
                Err(_) if started.elapsed() >= self.lock_timeout => {
                    if lock_is_stale(&self.lock_path) {
                        warn!(path = %self.lock_path.display(), "taking over stale rate-limit lock");
                        return Ok(LockGuard { file });
                    }
                    return Err(CacheError::LockTimeout(self.lock_path.display().to_string()));
                }
                Err(_) => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }
}

struct LockGuard {
    file: std::fs::File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn lock_is_stale(lock_path: &Path) -> bool {
    std::fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .map(|modified| {
            modified
                .elapsed()
                .map(|age| age >= STALE_LOCK_AGE)
                .unwrap_or(false)
        })
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_count_within_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RateLimitCounter::new(dir.path(), Path::new("data/counter.json")).unwrap();
        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment().unwrap(), 2);
    }

    #[test]
    fn current_count_does_not_mutate() {
        let dir = tempfile::tempdir().unwrap();
        let counter = RateLimitCounter::new(dir.path(), Path::new("data/counter.json")).unwrap();
        counter.increment().unwrap();
        assert_eq!(counter.current_count().unwrap(), 1);
        assert_eq!(counter.current_count().unwrap(), 1);
    }

    #[test]
    fn resets_on_stored_day_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = Path::new("data/counter.json");
        let counter = RateLimitCounter::new(dir.path(), path).unwrap();
        let stale_doc = CounterDoc {
            day: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            count: 99,
        };
        std::fs::write(&counter.path, serde_json::to_vec(&stale_doc).unwrap()).unwrap();
        assert_eq!(counter.current_count().unwrap(), 0);
        assert_eq!(counter.increment().unwrap(), 1);
    }
}
