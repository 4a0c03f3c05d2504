// src/crawl/parse.rs
//! Pure HTML extraction for blog index and post pages.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;

use crate::context::tag_markers;

/// A post link found on an index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub title: String,
    /// As written in the page (often site-relative).
    pub url: String,
    pub excerpt: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    pub posts: Vec<IndexEntry>,
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDetails {
    pub image: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<i64>,
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static POST_LINKS: Lazy<Selector> = Lazy::new(|| sel(r#"a[href*="/blog/"]"#));
static EXCERPT: Lazy<Selector> = Lazy::new(|| sel(".excerpt, .summary"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static NEXT: Lazy<Selector> =
    Lazy::new(|| sel(r#"a[rel="next"], .pagination .next, a.pagination-next"#));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:image"]"#));
static CONTENT_IMG: Lazy<Selector> = Lazy::new(|| sel("article img, .post-image img"));
static KEYWORDS: Lazy<Selector> = Lazy::new(|| sel(r#"meta[name="keywords"]"#));
static PUBLISHED: Lazy<Selector> =
    Lazy::new(|| sel(r#"meta[property="article:published_time"]"#));

/// Resolve `href` against `base`; absolute URLs pass through.
pub fn absolutize(href: &str, base: &Url) -> Option<String> {
    base.join(href.trim()).ok().map(String::from)
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn enclosing_article(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "article")
}

/// Post links with non-empty text, each with the excerpt and first image of
/// its enclosing `<article>`, plus the next-page link if any.
pub fn parse_index_page(html: &str, base: &Url) -> IndexPage {
    let doc = Html::parse_document(html);

    let posts = doc
        .select(&POST_LINKS)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let title = text_of(a);
            if href.is_empty() || title.is_empty() {
                return None;
            }
            let article = enclosing_article(a);
            let excerpt = article
                .map(|art| art.select(&EXCERPT).map(text_of).collect::<String>())
                .unwrap_or_default()
                .trim()
                .to_string();
            let image = article
                .and_then(|art| art.select(&IMG).next())
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| absolutize(src, base));
            Some(IndexEntry {
                title,
                url: href.to_string(),
                excerpt,
                image,
            })
        })
        .collect();

    let next_page = doc
        .select(&NEXT)
        .find_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());

    IndexPage { posts, next_page }
}

/// Image, tags and publish time from a post page. Tags are the comma-split
/// keywords followed by visible tag links, deduplicated in order.
pub fn parse_post_details(html: &str, base: &Url) -> PostDetails {
    let doc = Html::parse_document(html);

    let image = doc
        .select(&OG_IMAGE)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| {
            doc.select(&CONTENT_IMG)
                .next()
                .and_then(|img| img.value().attr("src"))
                .and_then(|src| absolutize(src, base))
        });

    let mut tags: Vec<String> = Vec::new();
    let keywords = doc
        .select(&KEYWORDS)
        .filter_map(|m| m.value().attr("content"))
        .flat_map(|c| c.split(','))
        .map(|t| t.trim().to_string());
    for t in keywords.chain(tag_markers(&doc)) {
        if !t.is_empty() && !tags.contains(&t) {
            tags.push(t);
        }
    }

    let published_at = doc
        .select(&PUBLISHED)
        .filter_map(|m| m.value().attr("content"))
        .find_map(parse_rfc3339_millis);

    PostDetails {
        image,
        tags,
        published_at,
    }
}

pub fn parse_rfc3339_millis(s: &str) -> Option<i64> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339).ok()?;
    i64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok()
}

/// Strip the site origin so the feed carries site-relative paths. URLs on
/// other hosts, and relative ones, are returned unchanged.
pub fn site_relative(url: &str, base: &Url) -> String {
    let origin = base.origin().ascii_serialization();
    match url.strip_prefix(origin.as_str()) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') || rest.starts_with('?') => rest.to_string(),
        _ => url.to_string(),
    }
}
