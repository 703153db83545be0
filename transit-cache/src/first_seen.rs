//! First-seen state store (spec §4.6): a `{key -> first-seen timestamp}`
//! map persisted atomically via the same primitive as [`crate::cache_store`].

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use transit_common::path_guard::guard_path;

use crate::atomic_write::{atomic_write, read_optional};
use crate::error::Result;

pub struct FirstSeenStore {
    path: std::path::PathBuf,
    entries: HashMap<String, DateTime<Utc>>,
}

impl FirstSeenStore {
    pub fn load(base_dir: &Path, configured: &Path) -> Result<Self> {
        let path = guard_path(base_dir, configured)?;
        let entries = match read_optional(&path)? {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str(&raw).unwrap_or_default()
            }
            _ => HashMap::new(),
        };
        Ok(Self { path, entries })
    }

    /// Record `key` as first seen `now` if it is not already known, and
    /// return its (possibly pre-existing) first-seen timestamp.
    pub fn observe(&mut self, key: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        *self.entries.entry(key.to_string()).or_insert(now)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).copied()
    }

    /// Drop entries older than `retention` relative to `now`.
    pub fn purge(&mut self, now: DateTime<Utc>, retention: Duration) {
        let cutoff = now - retention;
        self.entries.retain(|_, seen_at| *seen_at >= cutoff);
    }

    /// Keep only entries whose key is in `keys` (spec §4.6: after emission,
    /// retain only entries whose identity is in the emitted set).
    pub fn retain_keys(&mut self, keys: &std::collections::HashSet<String>) {
        self.entries.retain(|key, _| keys.contains(key));
    }

    pub fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        atomic_write(&self.path, &bytes)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn observe_records_first_seen_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FirstSeenStore::load(dir.path(), Path::new("data/first_seen.json")).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(store.observe("a", t0), t0);
        assert_eq!(store.observe("a", t1), t0);
    }

    #[test]
    fn purge_drops_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FirstSeenStore::load(dir.path(), Path::new("data/first_seen.json")).unwrap();
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store.observe("stale", old);
        store.observe("fresh", now);
        store.purge(now, Duration::days(540));
        assert!(!store.contains("stale"));
        assert!(store.contains("fresh"));
    }

    #[test]
    fn retain_keys_drops_anything_not_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FirstSeenStore::load(dir.path(), Path::new("data/first_seen.json")).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store.observe("kept", now);
        store.observe("dropped", now);
        let emitted: std::collections::HashSet<String> = ["kept".to_string()].into_iter().collect();
        store.retain_keys(&emitted);
        assert!(store.contains("kept"));
        assert!(!store.contains("dropped"));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = Path::new("data/first_seen.json");
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        {
            let mut store = FirstSeenStore::load(dir.path(), path).unwrap();
            store.observe("a", t0);
            store.persist().unwrap();
        }
        let reloaded = FirstSeenStore::load(dir.path(), path).unwrap();
        assert!(reloaded.contains("a"));
    }
}
