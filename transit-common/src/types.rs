use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three upstream sources. A closed set — this system is
/// specified against exactly these three providers, not an open registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTag {
    Municipal,
    NationalRailway,
    RegionalAuthority,
}

impl ProviderTag {
    /// Precedence used by the dedupe tie-break (§4.7, rule 4): higher wins.
    pub fn precedence(self) -> u8 {
        match self {
            ProviderTag::RegionalAuthority => 2,
            ProviderTag::NationalRailway => 1,
            ProviderTag::Municipal => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderTag::Municipal => "municipal",
            ProviderTag::NationalRailway => "national_railway",
            ProviderTag::RegionalAuthority => "regional_authority",
        }
    }

    pub fn all() -> [ProviderTag; 3] {
        [ProviderTag::Municipal, ProviderTag::NationalRailway, ProviderTag::RegionalAuthority]
    }

    /// Cache file path for this provider, read from its dedicated env var
    /// (e.g. `MUNICIPAL_CACHE_PATH`) with the documented default. Shared by
    /// `transit-refresh` (which writes it) and `transit-build-feed` (which
    /// reads it), so the two binaries never disagree about where a
    /// provider's data lives.
    pub fn cache_path_from_env(self) -> String {
        let (key, default) = match self {
            ProviderTag::Municipal => ("MUNICIPAL_CACHE_PATH", "data/cache_municipal.json"),
            ProviderTag::NationalRailway => ("NATIONAL_RAILWAY_CACHE_PATH", "data/cache_national_railway.json"),
            ProviderTag::RegionalAuthority => ("REGIONAL_AUTHORITY_CACHE_PATH", "data/cache_regional_authority.json"),
        };
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Whether this provider is enabled, read from its dedicated
    /// `ENABLE_*` env var (default enabled). Consulted by both
    /// `transit-refresh` (to skip a fetch cleanly) and `transit-build-feed`
    /// (to exclude the provider's cache file from aggregation).
    pub fn is_enabled_from_env(self) -> bool {
        let key = match self {
            ProviderTag::Municipal => "ENABLE_MUNICIPAL",
            ProviderTag::NationalRailway => "ENABLE_NATIONAL_RAILWAY",
            ProviderTag::RegionalAuthority => "ENABLE_REGIONAL_AUTHORITY",
        };
        crate::config::parse_env_bool(key, true)
    }
}

impl std::fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderTag {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "municipal" => Ok(Self::Municipal),
            "national_railway" => Ok(Self::NationalRailway),
            "regional_authority" => Ok(Self::RegionalAuthority),
            other => Err(format!("unknown provider tag: {other}")),
        }
    }
}

/// The canonical internal message record (spec §3).
///
/// Invariants enforced by construction elsewhere in the pipeline, not by
/// this type itself: `title`/`description` contain no raw HTML, control
/// characters other than `\n`/`\t`, or ANSI escapes; `description` has at
/// most two `\n`-separated lines; `ends_at >= starts_at` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub source: ProviderTag,
    pub category: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: String,
    pub pub_date: DateTime<Utc>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Provider-supplied dedup key, opaque. Preferred over `guid` during
    /// dedupe when present (spec §4.7).
    #[serde(default, rename = "_identity", skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl Event {
    /// The dedup key: `_identity` if provided, otherwise `guid`, otherwise
    /// a content hash of `source|title|description` (spec §4.7, GLOSSARY).
    pub fn dedupe_key(&self) -> String {
        if let Some(identity) = &self.identity {
            if !identity.is_empty() {
                return identity.clone();
            }
        }
        if !self.guid.is_empty() {
            return self.guid.clone();
        }
        content_hash(&format!("{}|{}|{}", self.source, self.title, self.description))
    }

    /// The identity used to key the first-seen map: same precedence as
    /// `dedupe_key`, since first-seen tracking and dedup share one notion
    /// of "the same event".
    pub fn first_seen_key(&self) -> String {
        self.dedupe_key()
    }
}

/// Stable content hash used as the dedup key of last resort. Not
/// cryptographically significant — just a deterministic, short fingerprint.
pub fn content_hash(input: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
