//! End-to-end: raw events from several providers go through the full
//! pipeline and come out as a well-formed RSS document, reproducing the
//! WL-1/WL-2/VOR-42 scenarios side by side in one build.

use chrono::{DateTime, Duration, TimeZone, Utc};
use transit_cache::FirstSeenStore;
use transit_common::{Event, ProviderTag};
use transit_feed::pipeline::{self, ClipConfig, PruneConfig};
use transit_feed::rss::{render, FeedMeta};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn event(source: ProviderTag, guid: &str, pub_date: DateTime<Utc>, ends_at: Option<DateTime<Utc>>, description: &str) -> Event {
    Event {
        source,
        category: "disruption".to_string(),
        title: format!("Title {guid}"),
        description: description.to_string(),
        link: String::new(),
        guid: guid.to_string(),
        pub_date,
        starts_at: None,
        ends_at,
        identity: None,
    }
}

#[test]
fn full_build_prunes_merges_and_renders() {
    let now = at(2026, 1, 10, 12, 0);
    let dir = tempfile::tempdir().unwrap();
    let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();

    // WL-2: far too old, no future end -- must be pruned.
    let stale = event(ProviderTag::Municipal, "WL-2", now - Duration::days(400), None, "Old elevator notice.");

    // WL-1 duplicate pair: same guid, different end dates and descriptions
    // -- must dedupe to one event with the later end date and merged text.
    let wl1_a = event(ProviderTag::Municipal, "WL-1", now - Duration::hours(2), Some(now + Duration::hours(1)), "Signal failure near Praterstern.");
    let wl1_b = event(ProviderTag::NationalRailway, "WL-1", now - Duration::hours(2), Some(now + Duration::hours(5)), "Expect delays on U2.");

    // A still-active regional event with no end date at all.
    let ongoing = event(ProviderTag::RegionalAuthority, "VOR-42", now - Duration::hours(1), None, "Schienenersatzverkehr.");

    let events = vec![stale, wl1_a, wl1_b, ongoing];

    let prune_config = PruneConfig {
        max_item_age_days: 365,
        absolute_max_age_days: 540,
        ends_at_grace_minutes: 10,
    };
    let events = pipeline::normalise(events);
    let (events, prune_stats) = pipeline::prune(events, now, &first_seen, &prune_config);
    assert_eq!(prune_stats.dropped, 1);

    let (events, dedupe_stats) = pipeline::dedupe(events);
    assert_eq!(dedupe_stats.merged, 1);
    assert_eq!(events.len(), 2);

    let events = pipeline::order(events, now, &first_seen, 5);
    // The open-ended regional event outranks the dedupe winner's later end
    // date only within dedupe groups; across groups, ordering is by
    // pub_date, so VOR-42 (more recent pub_date) sorts first.
    assert_eq!(events[0].guid, "VOR-42");
    assert_eq!(events[1].guid, "WL-1");
    assert_eq!(events[1].ends_at, Some(now + Duration::hours(5)));
    assert!(events[1].description.contains("Signal failure near Praterstern"));
    assert!(events[1].description.contains("Expect delays on U2"));

    let events = pipeline::clip(events, &ClipConfig { max_items: 30 });

    let meta = FeedMeta {
        title: "Wien Transit Disruptions".to_string(),
        link: "https://example.org/feed".to_string(),
        description: "Aggregated Vienna public-transport disruptions".to_string(),
        ttl_minutes: 30,
    };
    let xml = render(&events, &meta, &first_seen, now).unwrap();

    assert!(xml.contains("<rss version=\"2.0\""));
    assert!(xml.contains("VOR-42"));
    assert!(xml.contains("WL-1"));
    assert!(!xml.contains("WL-2"));
}
