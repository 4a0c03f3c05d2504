// src/ingest/mod.rs
pub mod providers;
pub mod rss;
pub mod types;

use crate::post::{normalize, Post};
use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::de::IgnoredAny;
use serde::Deserialize;
use types::{FeedSource, RawRecord};
use url::Url;

/// Excerpts longer than this many characters are cut and marked.
pub const EXCERPT_MAX_CHARS: usize = 200;
pub const TRUNCATION_MARKER: &str = "...";

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_records_total", "Raw records parsed from feeds.");
        describe_counter!("feed_fetch_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Strip markup to plain text: drop script/style blocks and tags, decode
/// entities, collapse whitespace, trim. Never fails.
pub fn strip_markup(s: &str) -> String {
    static RE_BLOCKS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("block regex")
    });
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));

    let out = RE_BLOCKS.replace_all(s, " ");
    let out = RE_TAGS.replace_all(&out, "");
    let out = html_escape::decode_html_entities(&out);
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// Cap text at `EXCERPT_MAX_CHARS` characters, appending the marker when cut.
pub fn truncate_excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_MAX_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(EXCERPT_MAX_CHARS).collect();
    format!("{}{}", head.trim_end(), TRUNCATION_MARKER)
}

#[derive(Deserialize)]
struct Collection {
    items: Vec<serde_json::Value>,
}

/// Accepted JSON feed shapes, tried in order.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    List(Vec<serde_json::Value>),
    Items { items: Vec<serde_json::Value> },
    Collection { collection: Collection },
    Unrecognized(IgnoredAny),
}

/// Parse a feed document (JSON list, `{items}`, `{collection: {items}}`, or RSS)
/// into raw records. A document that is not valid JSON/XML is an error; a valid
/// document of an unknown shape simply has no items.
pub fn parse_feed(doc: &str) -> Result<Vec<RawRecord>> {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();
    let doc = doc.strip_prefix('\u{feff}').unwrap_or(doc);

    let records = if doc.trim_start().starts_with('<') {
        rss::parse_rss(doc)?
    } else {
        let parsed: FeedDocument = serde_json::from_str(doc).context("parsing feed json")?;
        let items = match parsed {
            FeedDocument::List(v) => v,
            FeedDocument::Items { items } => items,
            FeedDocument::Collection { collection } => collection.items,
            FeedDocument::Unrecognized(_) => {
                tracing::debug!(target: "ingest", "feed document has no item list");
                Vec::new()
            }
        };
        items.into_iter().map(RawRecord::from_value).collect()
    };

    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("feed_records_total").increment(records.len() as u64);
    Ok(records)
}

/// Normalize raw records in feed order.
pub fn normalize_all(records: Vec<RawRecord>, site_base: Option<&Url>) -> Vec<Post> {
    records
        .into_iter()
        .map(|r| normalize(r, site_base))
        .collect()
}

/// Fetch one snapshot from `source` and normalize it.
pub async fn load_posts(source: &dyn FeedSource, site_base: Option<&Url>) -> Result<Vec<Post>> {
    ensure_metrics_described();
    match source.fetch_records().await {
        Ok(records) => Ok(normalize_all(records, site_base)),
        Err(e) => {
            tracing::warn!(target: "ingest", error = ?e, feed = source.name(), "feed unavailable");
            counter!("feed_fetch_errors_total").increment(1);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_collapses_ws_and_decodes() {
        let s = "  <p>Hello,&nbsp;&nbsp;<b>world</b>!</p>  ";
        assert_eq!(strip_markup(s), "Hello, world!");
    }

    #[test]
    fn strip_markup_drops_scripts_and_keeps_stray_lt() {
        let s = "<script>var x = 1 < 2;</script>a < b";
        assert_eq!(strip_markup(s), "a < b");
    }

    #[test]
    fn truncate_keeps_short_text() {
        let s = "x".repeat(EXCERPT_MAX_CHARS);
        assert_eq!(truncate_excerpt(&s), s);
    }

    #[test]
    fn truncate_cuts_on_char_boundary() {
        let s = "é".repeat(250);
        let out = truncate_excerpt(&s);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), EXCERPT_MAX_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn parse_feed_accepts_three_json_shapes() {
        let list = r#"[{"title":"A"},{"title":"B"}]"#;
        let items = r#"{"items":[{"title":"A"}]}"#;
        let nested = r#"{"collection":{"items":[{"title":"A"},{"title":"B"},{"title":"C"}]}}"#;
        assert_eq!(parse_feed(list).unwrap().len(), 2);
        assert_eq!(parse_feed(items).unwrap().len(), 1);
        assert_eq!(parse_feed(nested).unwrap().len(), 3);
    }

    #[test]
    fn parse_feed_unknown_shape_is_empty_and_garbage_is_error() {
        assert!(parse_feed(r#"{"posts": 3}"#).unwrap().is_empty());
        assert!(parse_feed(r#"{"items": "nope"}"#).unwrap().is_empty());
        assert!(parse_feed("not json at all").is_err());
    }

    #[test]
    fn parse_feed_skips_a_byte_order_mark() {
        let json = "\u{feff}{\"items\":[{\"title\":\"A\"}]}";
        assert_eq!(parse_feed(json).unwrap().len(), 1);

        let rss = "\u{feff}<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel><title>Blog</title>\
                   <item><title>A</title></item><item><title>B</title></item>\
                   </channel></rss>";
        assert_eq!(parse_feed(rss).unwrap().len(), 2);
    }
}
