// src/post.rs
//! Canonical post model and the normalizer that builds it from raw feed records.
//!
//! `normalize` is total: every malformed or missing field degrades to a
//! documented default, so any record yields exactly one `Post`.

use serde::Serialize;
use url::{ParseError, Url};

use crate::ingest::types::{Loose, RawMedia, RawRecord, RawTag};
use crate::ingest::{strip_markup, truncate_excerpt};

pub const UNTITLED: &str = "Untitled";

/// Origin used only to parse site-relative paths; never appears in output.
const PLACEHOLDER_ORIGIN: &str = "http://relative.invalid/";
const PLACEHOLDER_HOST: &str = "relative.invalid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub url: String,
    pub title: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub excerpt: String,
    pub thumbnail: String,
    pub published_at: i64,
}

/// Canonicalize a URL for storage and equality: lower-case scheme/host,
/// no default port, no fragment, no trailing slash. Relative values are
/// resolved against `base` when given, otherwise kept site-relative
/// (`/path?query`). Unparseable input yields `""`.
pub fn canonicalize_url(raw: &str, base: Option<&Url>) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    match Url::parse(raw) {
        Ok(u) => absolute_string(u),
        Err(ParseError::RelativeUrlWithoutBase) => match base {
            Some(b) => b.join(raw).map(absolute_string).unwrap_or_default(),
            None => site_relative(raw),
        },
        Err(e) => {
            tracing::debug!(target: "ingest", error = %e, "unparseable post url");
            String::new()
        }
    }
}

fn trim_path(u: &mut Url) {
    u.set_fragment(None);
    let path = u.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        u.set_path(path.trim_end_matches('/'));
    }
}

fn absolute_string(mut u: Url) -> String {
    trim_path(&mut u);
    let s = u.to_string();
    if u.path() == "/" && u.query().is_none() {
        s.trim_end_matches('/').to_string()
    } else {
        s
    }
}

fn site_relative(raw: &str) -> String {
    let Ok(origin) = Url::parse(PLACEHOLDER_ORIGIN) else {
        return String::new();
    };
    let Ok(mut u) = origin.join(raw) else {
        return String::new();
    };
    // Protocol-relative input ("//cdn.example/x") carries its own host.
    if u.host_str() != Some(PLACEHOLDER_HOST) {
        return absolute_string(u);
    }
    trim_path(&mut u);
    match u.query() {
        Some(q) => format!("{}?{}", u.path(), q),
        None => u.path().to_string(),
    }
}

/// URL equality for self-exclusion. Canonical strings must match, except that a
/// site-relative value also matches an absolute URL with the same path and query.
pub fn urls_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (rel, abs) = match (a.starts_with('/'), b.starts_with('/')) {
        (true, false) => (a, b),
        (false, true) => (b, a),
        _ => return false,
    };
    match Url::parse(abs) {
        Ok(u) => {
            let path = match u.query() {
                Some(q) => format!("{}?{}", u.path(), q),
                None => u.path().to_string(),
            };
            path == rel
        }
        Err(_) => false,
    }
}

/// Last non-empty path segment; `""` if the URL is empty or unparseable.
pub fn slug_of(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let parsed = match Url::parse(url) {
        Ok(u) => Ok(u),
        Err(ParseError::RelativeUrlWithoutBase) => {
            Url::parse(PLACEHOLDER_ORIGIN).and_then(|o| o.join(url))
        }
        Err(e) => Err(e),
    };
    parsed
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segs| segs.filter(|s| !s.is_empty()).last().map(str::to_string))
        })
        .unwrap_or_default()
}

fn non_empty(field: &Option<Loose<String>>) -> Option<&str> {
    field
        .as_ref()
        .and_then(Loose::value)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn tag_names(list: &[RawTag]) -> Vec<String> {
    list.iter().filter_map(RawTag::name).map(str::to_string).collect()
}

/// Build the canonical `Post` for one raw record.
pub fn normalize(record: RawRecord, site_base: Option<&Url>) -> Post {
    let title = non_empty(&record.title).unwrap_or(UNTITLED).to_string();

    let raw_url = non_empty(&record.full_url)
        .or_else(|| non_empty(&record.url))
        .unwrap_or_default();
    let url = canonicalize_url(raw_url, site_base);
    let slug = slug_of(&url);

    // `tags` wins whenever it is a list, even an empty one.
    let tags = match record.tags.as_ref().and_then(Loose::value) {
        Some(list) => tag_names(list),
        None => record
            .categories
            .as_ref()
            .and_then(Loose::value)
            .map(|l| tag_names(l))
            .unwrap_or_default(),
    };

    // A present excerpt wins even when nothing survives stripping.
    let stripped = non_empty(&record.excerpt)
        .or_else(|| non_empty(&record.body))
        .map(strip_markup)
        .unwrap_or_default();
    let excerpt = truncate_excerpt(&stripped);

    let thumbnail = non_empty(&record.asset_url)
        .or_else(|| non_empty(&record.image))
        .map(str::to_string)
        .or_else(|| {
            record.media.as_ref().and_then(Loose::value).and_then(|media| {
                media.iter().find_map(|m| match m {
                    RawMedia::WithUrl { url } if !url.trim().is_empty() => {
                        Some(url.trim().to_string())
                    }
                    _ => None,
                })
            })
        })
        .unwrap_or_default();

    let published_at = record
        .publish_on
        .as_ref()
        .and_then(Loose::value)
        .or_else(|| record.published_at.as_ref().and_then(Loose::value))
        .map(|t| t.millis())
        .unwrap_or(0);

    Post {
        url,
        title,
        slug,
        tags,
        excerpt,
        thumbnail,
        published_at,
    }
}
