// src/ingest/rss.rs
//! RSS 2.0 feeds mapped onto raw records, so they flow through the same normalizer.

use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{Loose, RawRecord, RawTag, RawTimestamp};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// RFC 2822 date → epoch milliseconds; 0 when unparseable.
fn parse_rfc2822_to_millis(ts: &str) -> i64 {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as i64)
        .filter(|ms| *ms > 0)
        .unwrap_or(0)
}

pub fn parse_rss(xml: &str) -> Result<Vec<RawRecord>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let out = rss
        .channel
        .item
        .into_iter()
        .map(|it| RawRecord {
            title: it.title.map(Loose::Value),
            url: it.link.map(|l| Loose::Value(l.trim().to_string())),
            tags: Some(Loose::Value(
                it.categories.into_iter().map(RawTag::Plain).collect(),
            )),
            body: it.description.map(Loose::Value),
            image: it.enclosure.and_then(|e| e.url).map(Loose::Value),
            publish_on: it
                .pub_date
                .as_deref()
                .map(|d| Loose::Value(RawTimestamp::Int(parse_rfc2822_to_millis(d)))),
            ..RawRecord::default()
        })
        .collect();
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title>
<item>
  <title>Walking through grief</title>
  <link>https://example.org/blog/walking-through-grief</link>
  <pubDate>Tue, 10 Jun 2025 08:00:00 +0000</pubDate>
  <description>&lt;p&gt;Hope&amp;nbsp;remains&lt;/p&gt;</description>
  <category>Grief</category>
  <category>Loss</category>
  <enclosure url="https://example.org/img/grief.jpg" type="image/jpeg" length="1"/>
</item>
<item><title>Bare</title></item>
</channel></rss>"#;

    #[test]
    fn rss_items_map_to_raw_records() {
        let recs = parse_rss(FEED).unwrap();
        assert_eq!(recs.len(), 2);

        let first = &recs[0];
        let tags: Vec<_> = first.tags.as_ref().unwrap().value().unwrap().iter()
            .filter_map(|t| t.name())
            .collect();
        assert_eq!(tags, vec!["Grief", "Loss"]);
        assert_eq!(
            first.image.as_ref().and_then(|l| l.value()).map(String::as_str),
            Some("https://example.org/img/grief.jpg")
        );
        let ms = first.publish_on.as_ref().and_then(|l| l.value()).unwrap().millis();
        assert_eq!(ms, 1_749_542_400_000);

        assert!(recs[1].url.is_none());
    }

    #[test]
    fn bad_dates_become_zero() {
        assert_eq!(parse_rfc2822_to_millis("someday"), 0);
    }
}
