use serde::{Deserialize, Serialize};

/// A single station as recorded in the catalogue file. Loaded once at
/// process start and never mutated afterwards, mirroring the plain
/// immutable value types `simweb::world::World` uses for its own
/// read-only fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationRecord {
    pub bst_id: String,
    pub short_code: Option<String>,
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub in_vienna: bool,
    #[serde(default)]
    pub pendler: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub regional_authority_id: Option<String>,
    pub source: Option<String>,
}

/// A single `(lat, lng)` vertex of the bundled Vienna boundary polygon.
pub type Vertex = (f64, f64);
