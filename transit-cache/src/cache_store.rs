//! Per-provider cache store (spec §4.5): atomic read/write of a JSON
//! array. A missing, empty or non-array file reads back as an empty
//! sequence with a warning; any other IO error is surfaced.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;
use transit_common::path_guard::guard_path;

use crate::atomic_write::{atomic_write, read_optional};
use crate::error::Result;

pub struct CacheStore {
    path: std::path::PathBuf,
}

impl CacheStore {
    pub fn new(base_dir: &Path, configured: &Path) -> Result<Self> {
        let path = guard_path(base_dir, configured)?;
        Ok(Self { path })
    }

    pub fn read<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache file is not a JSON array; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    pub fn write<T: Serialize>(&self, items: &[T]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(items)?;
        atomic_write(&self.path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn store_in(dir: &Path) -> CacheStore {
        CacheStore::new(dir, Path::new("data/cache.json")).unwrap()
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let store = store_in(dir.path());
        let items: Vec<Item> = store.read().unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn round_trips_items() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let store = store_in(dir.path());
        let items = vec![Item { id: 1 }, Item { id: 2 }];
        store.write(&items).unwrap();
        let read_back: Vec<Item> = store.read().unwrap();
        assert_eq!(read_back, items);
    }

    #[test]
    fn corrupt_json_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/cache.json"), b"{not valid json").unwrap();
        let store = store_in(dir.path());
        let items: Vec<Item> = store.read().unwrap();
        assert!(items.is_empty());
    }
}
