//! National-railway RSS provider (spec §4.2.b): consumes an upstream
//! RSS/Atom feed via `feed-rs`, keeps only items that mention the region by
//! keyword or an in-region station, and cleans titles.

use std::time::Duration;

use chrono::Utc;
use tracing::warn;
use transit_common::text::{clip_description, compose_description, strip_html, strip_leading_heading, time_phrase};
use transit_common::{content_hash, Event, ProviderTag};
use transit_http::{HardenedClient, Request};
use transit_stations::StationCatalogue;

use transit_common::config::parse_env_u64;

use crate::common::{clean_title, description_char_limit_from_env};
use crate::error::Result;

const REGIONAL_KEYWORDS: &[&str] = &["wien", "vienna"];

pub struct NationalRailwayProvider<'a> {
    client: HardenedClient,
    feed_url: String,
    timeout: Duration,
    description_char_limit: usize,
    stations: &'a StationCatalogue,
}

impl<'a> NationalRailwayProvider<'a> {
    pub fn new(
        feed_url: impl Into<String>,
        timeout: Duration,
        description_char_limit: usize,
        stations: &'a StationCatalogue,
    ) -> Self {
        Self {
            client: HardenedClient::new("transit-aggregator/0.1"),
            feed_url: feed_url.into(),
            timeout,
            description_char_limit,
            stations,
        }
    }

    pub fn from_env(stations: &'a StationCatalogue) -> Result<Self> {
        let feed_url = transit_common::config::required_env("NATIONAL_RAILWAY_FEED_URL")?;
        let timeout = Duration::from_secs(parse_env_u64("NATIONAL_RAILWAY_TIMEOUT_SECS", 25));
        Ok(Self::new(feed_url, timeout, description_char_limit_from_env(), stations))
    }

    /// Transport-level failures are caught here and turned into an empty
    /// result (spec §7): they never propagate past the adapter boundary.
    pub async fn fetch(&self) -> Result<Vec<Event>> {
        let request = Request::get(&self.feed_url).timeout(self.timeout);
        let response = match self.client.execute(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "national-railway provider: request failed");
                return Ok(Vec::new());
            }
        };

        if response.status != 200 {
            warn!(status = response.status, "national-railway provider: non-200 response");
            return Ok(Vec::new());
        }

        let feed = match feed_rs::parser::parse(&response.body[..]) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "national-railway provider: unparsable feed");
                return Ok(Vec::new());
            }
        };

        let mut events = Vec::new();
        for entry in feed.entries {
            let title_raw = entry.title.map(|t| t.content).unwrap_or_default();
            let summary_raw = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();

            if !self.is_in_region(&title_raw, &summary_raw) {
                continue;
            }

            let title = clean_title(&title_raw);
            let summary = strip_leading_heading(&strip_html(&summary_raw));
            let pub_date = entry
                .published
                .or(entry.updated)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let phrase = time_phrase(Utc::now(), None, None);
            let full_description = compose_description(&summary, &phrase);
            let description = clip_description(&full_description, self.description_char_limit);
            let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
            let guid = if entry.id.is_empty() {
                content_hash(&format!("{title}|{link}"))
            } else {
                entry.id.clone()
            };

            events.push(Event {
                source: ProviderTag::NationalRailway,
                category: "disruption".to_string(),
                title,
                description,
                link,
                guid,
                pub_date,
                starts_at: None,
                ends_at: None,
                identity: None,
            });
        }
        Ok(events)
    }

    /// Accept only items mentioning the regional keyword or an explicit
    /// in-region station name; reject items naming only out-of-region
    /// endpoints.
    fn is_in_region(&self, title: &str, summary: &str) -> bool {
        let haystack = format!("{title} {summary}").to_lowercase();
        if REGIONAL_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
            return true;
        }
        self.stations
            .records()
            .iter()
            .filter(|s| s.in_vienna)
            .any(|s| haystack.contains(&s.canonical_name.to_lowercase()))
    }
}
