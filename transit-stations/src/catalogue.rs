//! Station catalogue (spec §4.4): a read-only, in-memory index loaded once
//! at process start from a JSON file under `data/`, consulted by every
//! provider adapter and never mutated afterwards.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;
use transit_common::path_guard::guard_path;

use crate::error::Result;
use crate::name::normalize;
use crate::types::{StationRecord, Vertex};

/// Bundled polygon approximating the city limits of Vienna, used as the
/// fallback for `is_in_vienna` when a station carries coordinates but no
/// explicit `in_vienna` flag or alias match. Coarse by design: stations
/// near the border are expected to be disambiguated by the catalogue's
/// explicit flags, not the boundary check.
const VIENNA_BOUNDARY: &[Vertex] = &[
    (48.3222, 16.1825),
    (48.3222, 16.5775),
    (48.1179, 16.5775),
    (48.1179, 16.1825),
];

pub struct StationCatalogue {
    records: Vec<StationRecord>,
    by_canonical: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl StationCatalogue {
    /// Load the catalogue from `path`, which must resolve inside the
    /// `data/` allowlisted root relative to `base_dir`.
    pub fn load(base_dir: &Path, path: &Path) -> Result<Self> {
        let guarded = guard_path(base_dir, path)?;
        let raw = std::fs::read_to_string(&guarded)?;
        let records: Vec<StationRecord> = serde_json::from_str(&raw)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<StationRecord>) -> Self {
        let mut by_canonical = HashMap::new();
        let mut by_alias = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            let canonical = normalize(&record.canonical_name);
            by_canonical.entry(canonical).or_insert(idx);

            for alias in &record.aliases {
                let key = normalize(alias);
                if let Some(existing) = by_alias.get(&key) {
                    if *existing != idx {
                        warn!(alias = %alias, "alias collision in station catalogue; ignoring later entry");
                        continue;
                    }
                }
                by_alias.entry(key).or_insert(idx);
            }
        }

        Self {
            records,
            by_canonical,
            by_alias,
        }
    }

    fn lookup(&self, raw: &str) -> Option<&StationRecord> {
        let key = normalize(raw);
        self.by_canonical
            .get(&key)
            .or_else(|| self.by_alias.get(&key))
            .map(|&idx| &self.records[idx])
    }

    /// Canonical comparison form of a raw station name, resolved through
    /// the alias map when the raw form matches a known alias.
    pub fn canonical_name(&self, raw: &str) -> String {
        self.lookup(raw)
            .map(|r| r.canonical_name.clone())
            .unwrap_or_else(|| normalize(raw))
    }

    /// Whether a station name is within Vienna: by the catalogue's
    /// explicit `in_vienna` flag (via alias match) first, falling back to
    /// a point-in-polygon check against the bundled boundary when
    /// coordinates are supplied instead.
    pub fn is_in_vienna(&self, name: &str) -> bool {
        match self.lookup(name) {
            Some(r) if r.in_vienna => true,
            Some(r) => match (r.lat, r.lng) {
                (Some(lat), Some(lng)) => self.is_in_vienna_coord(lat, lng),
                _ => false,
            },
            None => false,
        }
    }

    pub fn is_in_vienna_coord(&self, lat: f64, lng: f64) -> bool {
        point_in_polygon(lat, lng, VIENNA_BOUNDARY)
    }

    pub fn is_commuter(&self, name: &str) -> bool {
        self.lookup(name).map(|r| r.pendler).unwrap_or(false)
    }

    pub fn regional_ids(&self, name: &str) -> Vec<String> {
        self.lookup(name)
            .and_then(|r| r.regional_authority_id.clone())
            .into_iter()
            .collect()
    }

    pub fn records(&self) -> &[StationRecord] {
        &self.records
    }
}

/// Ray-casting point-in-polygon test over a simple (non-self-intersecting)
/// polygon given as `(lat, lng)` vertices.
fn point_in_polygon(lat: f64, lng: f64, polygon: &[Vertex]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let (lat_i, lng_i) = polygon[i];
        let (lat_j, lng_j) = polygon[j];
        let crosses = (lat_i > lat) != (lat_j > lat);
        if crosses {
            let lng_intersect = lng_j + (lat - lat_j) / (lat_i - lat_j) * (lng_i - lng_j);
            if lng < lng_intersect {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<StationRecord> {
        vec![
            StationRecord {
                bst_id: "001".to_string(),
                short_code: Some("WMT".to_string()),
                canonical_name: "Wien Mitte".to_string(),
                aliases: vec!["Wien-Mitte".to_string(), "Landstraße".to_string()],
                in_vienna: true,
                pendler: false,
                lat: Some(48.2075),
                lng: Some(16.3845),
                regional_authority_id: Some("vor-42".to_string()),
                source: None,
            },
            StationRecord {
                bst_id: "002".to_string(),
                short_code: None,
                canonical_name: "Mödling".to_string(),
                aliases: vec![],
                in_vienna: false,
                pendler: true,
                lat: Some(48.0856),
                lng: Some(16.2836),
                regional_authority_id: None,
                source: None,
            },
        ]
    }

    #[test]
    fn resolves_alias_to_canonical_name() {
        let cat = StationCatalogue::from_records(sample());
        assert_eq!(cat.canonical_name("Landstraße"), "Wien Mitte");
    }

    #[test]
    fn is_in_vienna_by_alias_match() {
        let cat = StationCatalogue::from_records(sample());
        assert!(cat.is_in_vienna("Wien-Mitte"));
        assert!(!cat.is_in_vienna("Mödling"));
    }

    #[test]
    fn is_in_vienna_falls_back_to_coordinates_when_flag_is_false() {
        let mut records = sample();
        records.push(StationRecord {
            bst_id: "004".to_string(),
            short_code: None,
            canonical_name: "Unflagged Inner Station".to_string(),
            aliases: vec![],
            in_vienna: false,
            pendler: false,
            lat: Some(48.2),
            lng: Some(16.37),
            regional_authority_id: None,
            source: None,
        });
        let cat = StationCatalogue::from_records(records);
        assert!(cat.is_in_vienna("Unflagged Inner Station"));
    }

    #[test]
    fn is_commuter_flag() {
        let cat = StationCatalogue::from_records(sample());
        assert!(cat.is_commuter("Mödling"));
        assert!(!cat.is_commuter("Wien Mitte"));
    }

    #[test]
    fn regional_ids_for_station() {
        let cat = StationCatalogue::from_records(sample());
        assert_eq!(cat.regional_ids("Wien Mitte"), vec!["vor-42".to_string()]);
        assert!(cat.regional_ids("Mödling").is_empty());
    }

    #[test]
    fn colliding_alias_keeps_first_entry() {
        let mut records = sample();
        records.push(StationRecord {
            bst_id: "003".to_string(),
            short_code: None,
            canonical_name: "Wien Hauptbahnhof".to_string(),
            aliases: vec!["Landstraße".to_string()],
            in_vienna: true,
            pendler: false,
            lat: None,
            lng: None,
            regional_authority_id: None,
            source: None,
        });
        let cat = StationCatalogue::from_records(records);
        assert_eq!(cat.canonical_name("Landstraße"), "Wien Mitte");
    }

    #[test]
    fn point_in_polygon_matches_vienna_bounding_box() {
        assert!(point_in_polygon(48.2, 16.37, VIENNA_BOUNDARY));
        assert!(!point_in_polygon(48.0856, 16.2836, VIENNA_BOUNDARY));
    }
}
