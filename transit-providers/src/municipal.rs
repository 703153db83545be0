//! Municipal realtime provider (spec §4.2.a): polls a public JSON endpoint
//! for disturbance and news lists. No regional filter — the source is by
//! definition in-region. Keeps only active, non-maintenance records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use transit_common::text::{clip_description, compose_description, strip_html, strip_leading_heading, time_phrase};
use transit_common::{Event, ProviderTag};
use transit_http::{HardenedClient, Request};

use transit_common::config::parse_env_u64;

use crate::common::{build_identity, clean_title, description_char_limit_from_env};
use crate::error::Result;

const CATEGORY_FACILITY_MAINTENANCE: &str = "facility-maintenance";

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    lines: Vec<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    guid: Option<String>,
    pub_date: DateTime<Utc>,
    #[serde(default)]
    starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
}

pub struct MunicipalProvider {
    client: HardenedClient,
    endpoint: String,
    timeout: Duration,
    description_char_limit: usize,
}

impl MunicipalProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, description_char_limit: usize) -> Self {
        Self {
            client: HardenedClient::new("transit-aggregator/0.1"),
            endpoint: endpoint.into(),
            timeout,
            description_char_limit,
        }
    }

    /// Load endpoint and timeout from the environment. Credentials are not
    /// needed here: the municipal endpoint is a public realtime feed.
    pub fn from_env() -> Result<Self> {
        let endpoint = transit_common::config::required_env("MUNICIPAL_ENDPOINT")?;
        let timeout = Duration::from_secs(parse_env_u64("MUNICIPAL_TIMEOUT_SECS", 25));
        Ok(Self::new(endpoint, timeout, description_char_limit_from_env()))
    }

    /// Fetch, normalise and return today's active events. The caller is
    /// responsible for writing the provider's cache file. Transport-level
    /// failures are caught here and turned into an empty result (spec §7):
    /// they never propagate past the adapter boundary.
    pub async fn fetch(&self) -> Result<Vec<Event>> {
        let request = Request::get(&self.endpoint).timeout(self.timeout);
        let response = match self.client.execute(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "municipal provider: request failed");
                return Ok(Vec::new());
            }
        };

        if response.status != 200 {
            warn!(status = response.status, "municipal provider: non-200 response");
            return Ok(Vec::new());
        }

        let body: Value = match serde_json::from_slice(&response.body) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "municipal provider: unparsable response body");
                return Ok(Vec::new());
            }
        };

        let items = body.as_array().cloned().unwrap_or_default();
        let mut events = Vec::new();
        for item in items {
            match serde_json::from_value::<RawItem>(item) {
                Ok(raw) => {
                    if let Some(event) = self.normalise(raw) {
                        events.push(event);
                    }
                }
                Err(e) => warn!(error = %e, "municipal provider: skipping unparsable item"),
            }
        }
        Ok(events)
    }

    fn normalise(&self, raw: RawItem) -> Option<Event> {
        let is_active = raw.status.as_deref().map(|s| s.eq_ignore_ascii_case("active")).unwrap_or(true);
        let is_maintenance_note = raw
            .category
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(CATEGORY_FACILITY_MAINTENANCE))
            .unwrap_or(false);
        if !is_active || is_maintenance_note {
            return None;
        }

        let title = clean_title(&raw.title);
        let summary = strip_leading_heading(&strip_html(raw.description.as_deref().unwrap_or("")));
        let phrase = time_phrase(Utc::now(), raw.starts_at, raw.ends_at);
        let full_description = compose_description(&summary, &phrase);
        let description = clip_description(&full_description, self.description_char_limit);

        let category = raw.category.clone().unwrap_or_else(|| "general".to_string());
        let line = raw.lines.join(",");
        let identity = raw
            .guid
            .clone()
            .or_else(|| Some(build_identity("municipal", &category, &line, raw.pub_date)));

        Some(Event {
            source: ProviderTag::Municipal,
            category,
            title,
            description,
            link: raw.link.unwrap_or_default(),
            guid: raw.guid.unwrap_or_else(|| identity.clone().unwrap_or_default()),
            pub_date: raw.pub_date,
            starts_at: raw.starts_at,
            ends_at: raw.ends_at,
            identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawItem {
        RawItem {
            status: Some("active".to_string()),
            category: Some("elevator".to_string()),
            lines: vec!["U1".to_string()],
            title: "Bf. Karlsplatz: Aufzug außer Betrieb".to_string(),
            description: Some("<p>Der Aufzug ist derzeit außer Betrieb.</p>".to_string()),
            link: Some("https://example.org/notice/1".to_string()),
            guid: Some("municipal-1".to_string()),
            pub_date: Utc::now(),
            starts_at: None,
            ends_at: None,
        }
    }

    #[test]
    fn drops_inactive_items() {
        let provider = MunicipalProvider::new("https://example.org/feed", Duration::from_secs(5), 170);
        let mut raw = sample_raw();
        raw.status = Some("resolved".to_string());
        assert!(provider.normalise(raw).is_none());
    }

    #[test]
    fn drops_pure_maintenance_notes() {
        let provider = MunicipalProvider::new("https://example.org/feed", Duration::from_secs(5), 170);
        let mut raw = sample_raw();
        raw.category = Some(CATEGORY_FACILITY_MAINTENANCE.to_string());
        assert!(provider.normalise(raw).is_none());
    }

    #[test]
    fn normalises_title_and_description() {
        let provider = MunicipalProvider::new("https://example.org/feed", Duration::from_secs(5), 170);
        let event = provider.normalise(sample_raw()).unwrap();
        assert_eq!(event.title, "Karlsplatz: Aufzug außer Betrieb");
        assert!(!event.description.contains('<'));
        assert_eq!(event.guid, "municipal-1");
    }
}
