//! RSS 2.0 emitter (spec §4.8): writes the `ext:`-namespaced feed produced
//! by the aggregation pipeline, atomically.

use std::io::Cursor;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Europe::Vienna;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::Writer;
use transit_cache::atomic_write::atomic_write;
use transit_cache::FirstSeenStore;
use transit_common::Event;

use crate::error::Result;

const EXT_NAMESPACE: &str = "https://example.org/ns/transit-feed-ext/1.0";

#[derive(Debug, Clone)]
pub struct FeedMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    pub ttl_minutes: u32,
}

/// Render the channel + items to an RSS 2.0 XML string. `first_seen` must
/// already reflect this build's observations (§4.6) so `ext:first_seen` can
/// be populated per item.
pub fn render(events: &[Event], meta: &FeedMeta, first_seen: &FirstSeenStore, now: DateTime<Utc>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss_start = BytesStart::new("rss");
    rss_start.push_attribute(("version", "2.0"));
    rss_start.push_attribute(("xmlns:ext", EXT_NAMESPACE));
    rss_start.push_attribute(("xmlns:content", "http://purl.org/rss/1.0/modules/content/"));
    writer.write_event(XmlEvent::Start(rss_start))?;
    writer.write_event(XmlEvent::Start(BytesStart::new("channel")))?;

    write_text_element(&mut writer, "title", &meta.title)?;
    write_text_element(&mut writer, "link", &meta.link)?;
    write_text_element(&mut writer, "description", &meta.description)?;
    write_text_element(&mut writer, "lastBuildDate", &now.with_timezone(&Vienna).to_rfc2822())?;
    write_text_element(&mut writer, "ttl", &meta.ttl_minutes.to_string())?;

    for event in events {
        write_item(&mut writer, event, first_seen)?;
    }

    writer.write_event(XmlEvent::End(BytesEnd::new("channel")))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("rss")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render and write atomically to `path` (already validated by the caller
/// against the path allowlist).
pub fn write_to_file(
    events: &[Event],
    meta: &FeedMeta,
    first_seen: &FirstSeenStore,
    now: DateTime<Utc>,
    path: &std::path::Path,
) -> Result<()> {
    let xml = render(events, meta, first_seen, now)?;
    atomic_write(path, xml.as_bytes())?;
    Ok(())
}

fn write_item<W: std::io::Write>(writer: &mut Writer<W>, event: &Event, first_seen: &FirstSeenStore) -> Result<()> {
    writer.write_event(XmlEvent::Start(BytesStart::new("item")))?;

    write_text_element(writer, "title", &event.title)?;
    write_text_element(writer, "link", &event.link)?;
    write_cdata_element(writer, "description", &line_breaks_to_br(&event.description))?;
    write_cdata_element(writer, "content:encoded", &line_breaks_to_br(&event.description))?;
    write_text_element(writer, "pubDate", &event.pub_date.with_timezone(&Vienna).to_rfc2822())?;

    let mut guid_start = BytesStart::new("guid");
    guid_start.push_attribute(("isPermaLink", "false"));
    writer.write_event(XmlEvent::Start(guid_start))?;
    writer.write_event(XmlEvent::Text(BytesText::new(&event.guid)))?;
    writer.write_event(XmlEvent::End(BytesEnd::new("guid")))?;

    if let Some(seen_at) = first_seen.get(&event.first_seen_key()) {
        write_text_element(writer, "ext:first_seen", &to_iso8601_z(seen_at))?;
    }
    if let Some(starts_at) = event.starts_at {
        write_text_element(writer, "ext:starts_at", &to_iso8601_z(starts_at))?;
    }
    if let Some(ends_at) = event.ends_at {
        write_text_element(writer, "ext:ends_at", &to_iso8601_z(ends_at))?;
    }

    writer.write_event(XmlEvent::End(BytesEnd::new("item")))?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
    writer.write_event(XmlEvent::Text(BytesText::new(text)))?;
    writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_cdata_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(XmlEvent::Start(BytesStart::new(name)))?;
    writer.write_event(XmlEvent::CData(BytesCData::new(text)))?;
    writer.write_event(XmlEvent::End(BytesEnd::new(name)))?;
    Ok(())
}

fn line_breaks_to_br(text: &str) -> String {
    text.replace('\n', "<br/>")
}

fn to_iso8601_z(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use transit_common::ProviderTag;

    fn sample_event() -> Event {
        Event {
            source: ProviderTag::RegionalAuthority,
            category: "disruption".to_string(),
            title: "S7: Bauarbeiten".to_string(),
            description: "Schienenersatzverkehr\n01.06.2025 \u{2013} 03.06.2025".to_string(),
            link: String::new(),
            guid: "VOR-42".to_string(),
            pub_date: Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap(),
            starts_at: Some(Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap()),
            ends_at: Some(Utc.with_ymd_and_hms(2025, 6, 3, 19, 0, 0).unwrap()),
            identity: None,
        }
    }

    #[test]
    fn renders_ext_fields_and_cdata_description() {
        let dir = tempfile::tempdir().unwrap();
        let mut first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let event = sample_event();
        first_seen.observe(&event.first_seen_key(), now);

        let meta = FeedMeta {
            title: "Wien Transit Disruptions".to_string(),
            link: "https://example.org/feed".to_string(),
            description: "Aggregated Vienna public-transport disruptions".to_string(),
            ttl_minutes: 30,
        };

        let xml = render(&[event], &meta, &first_seen, now).unwrap();
        assert!(xml.contains("<ext:starts_at>2025-06-01T07:00:00Z</ext:starts_at>"));
        assert!(xml.contains("<ext:ends_at>2025-06-03T19:00:00Z</ext:ends_at>"));
        assert!(xml.contains("<![CDATA[Schienenersatzverkehr<br/>01.06.2025"));
        assert!(xml.contains(r#"<guid isPermaLink="false">VOR-42</guid>"#));
        assert!(xml.contains(r#"xmlns:ext="https://example.org/ns/transit-feed-ext/1.0""#));
    }

    #[test]
    fn escapes_special_characters_in_plain_text_elements() {
        let dir = tempfile::tempdir().unwrap();
        let first_seen = FirstSeenStore::load(dir.path(), std::path::Path::new("data/first_seen.json")).unwrap();
        let mut event = sample_event();
        event.title = "U1 & U2: <Störung>".to_string();
        let meta = FeedMeta {
            title: "Feed".to_string(),
            link: "https://example.org".to_string(),
            description: "desc".to_string(),
            ttl_minutes: 30,
        };
        let xml = render(&[event], &meta, &first_seen, Utc::now()).unwrap();
        assert!(xml.contains("U1 &amp; U2: &lt;Störung&gt;"));
    }
}
