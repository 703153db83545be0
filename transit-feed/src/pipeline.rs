//! Aggregation pipeline (spec §4.7): `Normalise -> Prune -> Dedupe -> Order
//! -> Clip`, each stage a pure function over the previous stage's
//! `Vec<Event>`. `Collect` (reading provider caches) and `Emit` (writing the
//! RSS file and updating first-seen) live in the binaries that call this
//! crate, mirroring the "stage as a function over a `Vec`" shape used
//! throughout the provider pipeline.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, TimeZone, Utc};
use transit_cache::FirstSeenStore;
use transit_common::text::collapse_whitespace;
use transit_common::Event;

/// Sentinel standing in for "no end date" when ranking dedupe candidates:
/// an open-ended disruption outranks any event with a concrete end.
static FAR_FUTURE: LazyLock<DateTime<Utc>> = LazyLock::new(|| Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap());
/// Sentinel standing in for "no start date" when ranking candidates or
/// ordering output.
static FAR_PAST: LazyLock<DateTime<Utc>> = LazyLock::new(|| Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct PruneStats {
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeStats {
    pub groups: usize,
    pub merged: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PruneConfig {
    pub max_item_age_days: i64,
    pub absolute_max_age_days: i64,
    pub ends_at_grace_minutes: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct ClipConfig {
    pub max_items: usize,
}

/// Re-collapse whitespace in title/description. A safety net: provider
/// adapters already normalise their own output, but a dedupe merge can
/// reintroduce run-on whitespace when two descriptions are joined.
pub fn normalise(events: Vec<Event>) -> Vec<Event> {
    events
        .into_iter()
        .map(|mut e| {
            e.title = collapse_whitespace(&e.title);
            e.description = collapse_whitespace(&e.description);
            e
        })
        .collect()
}

/// Drop events per the four prune rules in spec §4.7. `first_seen` reflects
/// the state from *before* this build (the Order stage's freshness check and
/// the final persist both depend on seeing the pre-build map).
pub fn prune(
    events: Vec<Event>,
    now: DateTime<Utc>,
    first_seen: &FirstSeenStore,
    config: &PruneConfig,
) -> (Vec<Event>, PruneStats) {
    let max_age = Duration::days(config.max_item_age_days);
    let absolute_max_age = Duration::days(config.absolute_max_age_days);
    let grace = Duration::minutes(config.ends_at_grace_minutes);

    let mut stats = PruneStats::default();
    let kept = events
        .into_iter()
        .filter(|e| {
            let age = now - e.pub_date;

            if age > absolute_max_age {
                stats.dropped += 1;
                return false;
            }

            let has_future_end = e.ends_at.map(|end| end > now).unwrap_or(false);
            if age > max_age && !has_future_end {
                stats.dropped += 1;
                return false;
            }

            if let Some(end) = e.ends_at {
                if now - end >= grace {
                    stats.dropped += 1;
                    return false;
                }
            }

            if let Some(seen_at) = first_seen.get(&e.first_seen_key()) {
                if now - seen_at > max_age {
                    stats.dropped += 1;
                    return false;
                }
            }

            true
        })
        .collect();

    (kept, stats)
}

/// Group events by `dedupe_key`, keep the best candidate per group per the
/// tie-break order in spec §4.7, merging unique sentences from the loser's
/// description into the winner's.
pub fn dedupe(events: Vec<Event>) -> (Vec<Event>, DedupeStats) {
    use std::collections::HashMap;

    let mut groups: HashMap<String, Vec<(usize, Event)>> = HashMap::new();
    for (idx, event) in events.into_iter().enumerate() {
        groups.entry(event.dedupe_key()).or_default().push((idx, event));
    }

    let mut stats = DedupeStats {
        groups: groups.len(),
        merged: 0,
    };

    let mut winners: Vec<(usize, Event)> = groups
        .into_values()
        .map(|mut candidates| {
            candidates.sort_by(|a, b| compare_candidates(&a.1, &b.1, a.0, b.0));
            let (winner_idx, mut winner) = candidates.remove(0);
            for (_, loser) in candidates {
                if merge_unique_sentences(&mut winner.description, &loser.description) {
                    stats.merged += 1;
                }
            }
            (winner_idx, winner)
        })
        .collect();

    winners.sort_by_key(|(idx, _)| *idx);
    (winners.into_iter().map(|(_, e)| e).collect(), stats)
}

/// Ordering for dedupe candidates: the *first* element after sorting is the
/// winner. Implements spec §4.7's five-rule tie-break, most-preferred first.
fn compare_candidates(a: &Event, b: &Event, a_idx: usize, b_idx: usize) -> std::cmp::Ordering {
    // An absent `ends_at` reads as an open-ended, still-active disruption,
    // so it outranks any concrete end date.
    let end_key = |e: &Event| e.ends_at.unwrap_or(*FAR_FUTURE);
    end_key(b)
        .cmp(&end_key(a))
        .then_with(|| b.pub_date.cmp(&a.pub_date))
        .then_with(|| {
            let a_start = a.starts_at.unwrap_or(*FAR_PAST);
            let b_start = b.starts_at.unwrap_or(*FAR_PAST);
            b_start.cmp(&a_start)
        })
        .then_with(|| b.description.len().cmp(&a.description.len()))
        .then_with(|| b.source.precedence().cmp(&a.source.precedence()))
        .then_with(|| a_idx.cmp(&b_idx))
}

/// Append sentences from `loser` to `winner` that don't already appear
/// (case-insensitively) in it. Returns whether anything was appended.
fn merge_unique_sentences(winner: &mut String, loser: &str) -> bool {
    let winner_lower = winner.to_lowercase();
    let mut appended = false;

    for sentence in split_sentences(loser) {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !winner_lower.contains(&trimmed.to_lowercase()) {
            if !winner.is_empty() && !winner.ends_with('\n') {
                winner.push(' ');
            }
            winner.push_str(trimmed);
            appended = true;
        }
    }
    appended
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['\n', '.'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Sort descending by `pub_date` (ties: `starts_at` descending, then title
/// ascending). First applies the fresh-pubdate rule: an event whose
/// `pub_date` is within `fresh_window_min` of `now` and that wasn't already
/// in `first_seen` is stamped with `now` instead.
pub fn order(
    mut events: Vec<Event>,
    now: DateTime<Utc>,
    first_seen: &FirstSeenStore,
    fresh_window_min: i64,
) -> Vec<Event> {
    let window = Duration::minutes(fresh_window_min);

    for event in &mut events {
        let within_window = (now - event.pub_date).abs() <= window;
        if within_window && !first_seen.contains(&event.first_seen_key()) {
            event.pub_date = now;
        }
    }

    events.sort_by(|a, b| {
        b.pub_date
            .cmp(&a.pub_date)
            .then_with(|| {
                let a_start = a.starts_at.unwrap_or(*FAR_PAST);
                let b_start = b.starts_at.unwrap_or(*FAR_PAST);
                b_start.cmp(&a_start)
            })
            .then_with(|| a.title.cmp(&b.title))
    });

    events
}

/// Enforce `max_items`. Description clipping is done by providers at
/// normalisation time (spec §4.2); this stage only truncates the list.
pub fn clip(mut events: Vec<Event>, config: &ClipConfig) -> Vec<Event> {
    events.truncate(config.max_items);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use transit_common::ProviderTag;

    fn event(guid: &str, pub_date: DateTime<Utc>, ends_at: Option<DateTime<Utc>>, description: &str) -> Event {
        Event {
            source: ProviderTag::Municipal,
            category: "disruption".to_string(),
            title: "Title".to_string(),
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
    fn prune_drops_event_older_than_max_age_with_no_future_end() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let config = PruneConfig {
            max_item_age_days: 365,
            absolute_max_age_days: 540,
            ends_at_grace_minutes: 10,
        };
        let (kept, stats) = prune(vec![event("WL-2", old, None, "desc")], now, &first_seen, &config);
        assert!(kept.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn prune_keeps_old_event_with_future_end() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let future_end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let config = PruneConfig {
            max_item_age_days: 365,
            absolute_max_age_days: 540,
            ends_at_grace_minutes: 10,
        };
        let (kept, _) = prune(vec![event("ongoing", old, Some(future_end), "desc")], now, &first_seen, &config);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn prune_drops_ended_past_grace() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ended = now - Duration::minutes(20);
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let config = PruneConfig {
            max_item_age_days: 365,
            absolute_max_age_days: 540,
            ends_at_grace_minutes: 10,
        };
        let (kept, stats) = prune(vec![event("x", now, Some(ended), "desc")], now, &first_seen, &config);
        assert!(kept.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn prune_drops_event_ended_exactly_now_with_zero_grace() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let config = PruneConfig {
            max_item_age_days: 365,
            absolute_max_age_days: 540,
            ends_at_grace_minutes: 0,
        };
        let (kept, stats) = prune(vec![event("x", now, Some(now), "desc")], now, &first_seen, &config);
        assert!(kept.is_empty());
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn prune_keeps_ended_within_grace() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ended = now - Duration::minutes(5);
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let config = PruneConfig {
            max_item_age_days: 365,
            absolute_max_age_days: 540,
            ends_at_grace_minutes: 10,
        };
        let (kept, _) = prune(vec![event("x", now, Some(ended), "desc")], now, &first_seen, &config);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn dedupe_keeps_later_ending_event_and_merges_sentences() {
        let pub_date = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let earlier_end = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let later_end = Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap();

        let first = event("WL-1", pub_date, Some(earlier_end), "Signal failure near Praterstern.");
        let second = event("WL-1", pub_date, Some(later_end), "Expect delays on U2.");

        let (result, stats) = dedupe(vec![first, second]);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].ends_at, Some(later_end));
        assert!(result[0].description.contains("Expect delays on U2"));
        assert!(result[0].description.contains("Signal failure near Praterstern"));
        assert_eq!(stats.merged, 1);
    }

    #[test]
    fn dedupe_enforces_distinct_keys_in_output() {
        let pub_date = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let events = vec![
            event("A", pub_date, None, "one"),
            event("A", pub_date, None, "two"),
            event("B", pub_date, None, "three"),
        ];
        let (result, _) = dedupe(events);
        let mut keys: Vec<_> = result.iter().map(Event::dedupe_key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), result.len());
    }

    #[test]
    fn order_breaks_identical_pub_date_ties_by_title() {
        let pub_date = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let mut b = event("b", pub_date, None, "desc");
        b.title = "Bravo".to_string();
        let mut a = event("a", pub_date, None, "desc");
        a.title = "Alpha".to_string();
        first_seen.observe("a", pub_date);
        first_seen.observe("b", pub_date);

        let ordered = order(vec![b, a], pub_date, &first_seen, 5);
        assert_eq!(ordered[0].title, "Alpha");
        assert_eq!(ordered[1].title, "Bravo");
    }

    #[test]
    fn order_stamps_fresh_unseen_event_with_now() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let pub_date = now - Duration::minutes(2);
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let e = event("new", pub_date, None, "desc");
        let ordered = order(vec![e], now, &first_seen, 5);
        assert_eq!(ordered[0].pub_date, now);
    }

    #[test]
    fn clip_truncates_to_max_items() {
        let pub_date = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let events: Vec<Event> = (0..5).map(|i| event(&i.to_string(), pub_date, None, "desc")).collect();
        let clipped = clip(events, &ClipConfig { max_items: 3 });
        assert_eq!(clipped.len(), 3);
    }
}
