//! Helpers shared by all three provider adapters: title cleanup and the
//! synthetic `_identity` construction spec §4.2 requires when upstream
//! supplies no durable id.

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Vienna;
use regex::Regex;
use std::sync::LazyLock;
use transit_common::config::parse_env_u64;
use transit_common::text::synthetic_identity;

static DUPLICATE_ARROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\s*(?:->|=>|»|→)\s*){2,}").unwrap());
static STATION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(bf\.?|bhf\.?|station)\s+").unwrap());

/// Collapse repeated arrow separators (`A -> -> B`) to a single one and
/// strip a leading station-type label upstream sometimes prepends to a
/// title (`Bf. Wien Mitte: ...` -> `Wien Mitte: ...`).
pub fn clean_title(raw: &str) -> String {
    let collapsed = DUPLICATE_ARROW_RE.replace_all(raw.trim(), " -> ");
    STATION_PREFIX_RE.replace(&collapsed, "").trim().to_string()
}

/// Local (Europe/Vienna) calendar day for a UTC instant, used to key
/// `_identity` values that vary by service day.
pub fn local_service_day(at: DateTime<Utc>) -> String {
    at.with_timezone(&Vienna).date_naive().to_string()
}

/// Build the `provider|category|line|localdate` synthetic identity spec
/// §4.2 describes for upstreams with no durable id of their own.
pub fn build_identity(provider: &str, category: &str, line: &str, at: DateTime<Utc>) -> String {
    synthetic_identity(&[provider, category, line, &local_service_day(at)])
}

/// `DESCRIPTION_CHAR_LIMIT` is read directly by every provider adapter, not
/// routed through `transit_common::Config`, since a refresh run never loads
/// the feed-shape config group that env var otherwise belongs to (spec §6).
pub fn description_char_limit_from_env() -> usize {
    parse_env_u64("DESCRIPTION_CHAR_LIMIT", 170) as usize
}
