//! Text normalisation shared by every provider adapter (spec §4.2) and by
//! the RSS emitter's description clipping (spec §4.7, Clip stage).

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Vienna;
use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());
static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_LINE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());
static LEADING_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(bauarbeiten|st[oö]rung|zeitraum\s*:)\s*").unwrap()
});

/// Strip HTML tags and decode entities, collapsing internal whitespace while
/// preserving intended paragraph breaks as a single `\n`.
pub fn strip_html(raw: &str) -> String {
    let plain = html2text::from_read(raw.as_bytes(), usize::from(u16::MAX))
        .unwrap_or_else(|_| raw.to_string());
    collapse_whitespace(&plain)
}

/// Collapse runs of horizontal whitespace to a single space and runs of
/// blank lines to a single `\n`; strip control characters other than
/// `\n`/`\t` and any ANSI escape sequence.
pub fn collapse_whitespace(s: &str) -> String {
    let no_ansi = ANSI_ESCAPE_RE.replace_all(s, "");
    let no_control: String = no_ansi
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect();
    let collapsed_spaces = WHITESPACE_RUN_RE.replace_all(&no_control, " ");
    let collapsed_blanks = BLANK_LINE_RUN_RE.replace_all(&collapsed_spaces, "\n");
    collapsed_blanks.trim().to_string()
}

/// Remove a redundant leading heading (`Bauarbeiten`, `Störung`, the label
/// `Zeitraum:`) that upstream sources prepend to every item.
pub fn strip_leading_heading(s: &str) -> String {
    LEADING_HEADING_RE.replace(s, "").trim().to_string()
}

/// Compose the description's second line: a human-readable time phrase.
/// Day boundaries are evaluated in Europe/Vienna local calendar time
/// (spec §4.2).
pub fn time_phrase(
    now: DateTime<Utc>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
) -> String {
    let now_local = now.with_timezone(&Vienna);

    match (starts_at, ends_at) {
        (Some(start), Some(end)) if end > start => {
            let start_local = start.with_timezone(&Vienna);
            let end_local = end.with_timezone(&Vienna);
            if start_local.date_naive() == end_local.date_naive() && start_local.date_naive() >= now_local.date_naive() {
                format!("Am {}", format_date(start_local.date_naive()))
            } else {
                format!(
                    "{} \u{2013} {}",
                    format_date(start_local.date_naive()),
                    format_date(end_local.date_naive())
                )
            }
        }
        (Some(start), ends) => {
            let start_local = start.with_timezone(&Vienna);
            let ended_or_absent_future = match ends {
                Some(end) => end <= start,
                None => true,
            };
            if start_local.date_naive() > now_local.date_naive() {
                format!("Ab {}", format_date(start_local.date_naive()))
            } else if ended_or_absent_future || start <= now {
                format!("Seit {}", format_date(start_local.date_naive()))
            } else {
                format!("Ab {}", format_date(start_local.date_naive()))
            }
        }
        (None, _) => {
            format!("Seit {}", format_date(now_local.date_naive()))
        }
    }
}

fn format_date(d: chrono::NaiveDate) -> String {
    d.format("%d.%m.%Y").to_string()
}

/// Compose the full two-line description: a summary on the first line and
/// the time phrase on the second.
pub fn compose_description(summary: &str, phrase: &str) -> String {
    format!("{summary}\n{phrase}")
}

/// Clip `full` to at most `limit` characters, breaking on a word or
/// sentence boundary and appending a single ellipsis. Never cuts inside a
/// word. If `full` already fits, it is returned unchanged.
pub fn clip_description(full: &str, limit: usize) -> String {
    if full.chars().count() <= limit {
        return full.to_string();
    }

    let ellipsis = '\u{2026}';
    // Reserve room for the ellipsis.
    let budget = limit.saturating_sub(1);
    let chars: Vec<char> = full.chars().collect();
    let mut cut = budget.min(chars.len());

    // Prefer a sentence boundary within the budget.
    if let Some(pos) = chars[..cut]
        .iter()
        .enumerate()
        .rev()
        .find(|(_, c)| matches!(c, '.' | '!' | '?'))
        .map(|(i, _)| i + 1)
    {
        cut = pos;
    } else if let Some(pos) = chars[..cut].iter().rposition(|c| c.is_whitespace()) {
        cut = pos;
    }

    let clipped: String = chars[..cut].iter().collect();
    format!("{}{}", clipped.trim_end(), ellipsis)
}

/// Construct a stable `_identity` for providers that have no durable
/// upstream id, e.g. `provider|category|line|localdate`.
pub fn synthetic_identity(parts: &[&str]) -> String {
    parts.join("|")
}
