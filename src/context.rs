// src/context.rs
//! Query side of matching: the identified current post, or an ambient page
//! context built once per invocation from page metadata.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

use crate::post::{canonicalize_url, slug_of, Post};

/// Which scoring flavor a context asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Built from a post found in the feed: tag overlap only.
    Identified,
    /// Built from page metadata: tag overlap plus title token overlap.
    #[default]
    Ambient,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    #[serde(default)]
    pub kind: ContextKind,
    #[serde(default)]
    pub identity_url: String,
    #[serde(default)]
    pub identity_slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl PageContext {
    /// Context of an identified current post.
    pub fn for_post(post: &Post) -> Self {
        Self {
            kind: ContextKind::Identified,
            identity_url: post.url.clone(),
            identity_slug: post.slug.clone(),
            title: post.title.clone(),
            description: post.excerpt.clone(),
            tags: post.tags.iter().cloned().collect(),
        }
    }

    /// Ambient context from declared page metadata. Blank keywords are dropped.
    pub fn ambient<I, S>(title: &str, description: &str, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kind: ContextKind::Ambient,
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            tags: clean_keywords(keywords),
            ..Self::default()
        }
    }

    /// Attach the URL of the viewed page so it can be excluded from results.
    pub fn with_page_url(mut self, url: &str, site_base: Option<&Url>) -> Self {
        self.identity_url = canonicalize_url(url, site_base);
        self.identity_slug = slug_of(&self.identity_url);
        self
    }

    /// Extract ambient context from page markup: title, description,
    /// comma-separated keywords, visible tag links and the canonical URL.
    pub fn from_html(html: &str, site_base: Option<&Url>) -> Self {
        static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
        static OG_TITLE: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:title"]"#));
        static DESC: Lazy<Selector> = Lazy::new(|| sel(r#"meta[name="description"]"#));
        static OG_DESC: Lazy<Selector> =
            Lazy::new(|| sel(r#"meta[property="og:description"]"#));
        static KEYWORDS: Lazy<Selector> = Lazy::new(|| sel(r#"meta[name="keywords"]"#));
        static CANONICAL: Lazy<Selector> = Lazy::new(|| sel(r#"link[rel="canonical"]"#));
        static OG_URL: Lazy<Selector> = Lazy::new(|| sel(r#"meta[property="og:url"]"#));

        let doc = Html::parse_document(html);

        let title = doc
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>())
            .filter(|t| !t.trim().is_empty())
            .or_else(|| attr(&doc, &OG_TITLE, "content"))
            .unwrap_or_default();
        let description = attr(&doc, &DESC, "content")
            .or_else(|| attr(&doc, &OG_DESC, "content"))
            .unwrap_or_default();

        let mut keywords: Vec<String> = Vec::new();
        for el in doc.select(&KEYWORDS) {
            if let Some(c) = el.value().attr("content") {
                keywords.extend(c.split(',').map(str::to_string));
            }
        }
        keywords.extend(tag_markers(&doc));

        let ctx = Self::ambient(&title, &description, keywords);
        match attr(&doc, &CANONICAL, "href").or_else(|| attr(&doc, &OG_URL, "content")) {
            Some(u) => ctx.with_page_url(&u, site_base),
            None => ctx,
        }
    }
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn attr(doc: &Html, selector: &Selector, name: &str) -> Option<String> {
    doc.select(selector)
        .filter_map(|el| el.value().attr(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Visible tag links (`.tags a`, `.post-tags a`, `.taglist a`), in page order.
pub fn tag_markers(doc: &Html) -> Vec<String> {
    static MARKERS: Lazy<Selector> = Lazy::new(|| sel(".tags a, .post-tags a, .taglist a"));
    doc.select(&MARKERS)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn clean_keywords<I, S>(keywords: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Clean an externally supplied identity (slug or URL fragment): trim
/// whitespace and surrounding slashes; absolute URLs reduce to their slug.
pub fn clean_identity(raw: &str) -> String {
    let t = raw.trim();
    if let Ok(u) = Url::parse(t) {
        if u.has_host() {
            return slug_of(u.as_str());
        }
    }
    t.trim_matches('/').to_string()
}

/// Resolve the viewer's current post: exact slug match first, then the first
/// post whose URL contains `"/" + slug`. An empty identity resolves to nothing.
pub fn resolve_current<'a>(posts: &'a [Post], identity: &str) -> Option<&'a Post> {
    let slug = clean_identity(identity);
    if slug.is_empty() {
        return None;
    }
    let needle = format!("/{}", slug);
    posts
        .iter()
        .find(|p| p.slug == slug)
        .or_else(|| posts.iter().find(|p| p.url.contains(&needle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawRecord;
    use crate::post::normalize;
    use serde_json::json;

    fn posts() -> Vec<Post> {
        [
            json!({ "title": "A", "url": "/blog/2024/hope-in-grief" }),
            json!({ "title": "B", "url": "/blog/faith/doubt" }),
            json!({ "title": "C", "url": "/blog/hope-in-grief-part-two" }),
        ]
        .into_iter()
        .map(|v| normalize(RawRecord::from_value(v), None))
        .collect()
    }

    #[test]
    fn exact_slug_wins_over_substring() {
        let ps = posts();
        let cur = resolve_current(&ps, "/hope-in-grief/").unwrap();
        assert_eq!(cur.title, "A");
    }

    #[test]
    fn falls_back_to_url_substring() {
        let ps = posts();
        // "faith" is not a slug but appears as "/faith" in B's URL.
        let cur = resolve_current(&ps, "faith").unwrap();
        assert_eq!(cur.title, "B");
    }

    #[test]
    fn empty_or_unknown_identity_resolves_to_none() {
        let ps = posts();
        assert!(resolve_current(&ps, "").is_none());
        assert!(resolve_current(&ps, " / ").is_none());
        assert!(resolve_current(&ps, "missing-post").is_none());
    }

    #[test]
    fn absolute_identity_reduces_to_slug() {
        assert_eq!(clean_identity("https://example.org/blog/doubt/"), "doubt");
        assert_eq!(clean_identity("/blog/doubt/"), "blog/doubt");
    }

    #[test]
    fn for_post_is_identified() {
        let ps = posts();
        let ctx = PageContext::for_post(&ps[1]);
        assert_eq!(ctx.kind, ContextKind::Identified);
        assert_eq!(ctx.identity_slug, "doubt");
        assert!(!ctx.identity_url.is_empty());
    }

    #[test]
    fn html_context_reads_meta_and_markers() {
        let html = r#"<html><head>
            <title> Finding hope after loss </title>
            <meta name="description" content="A short reflection.">
            <meta name="keywords" content="Grief, Hope, ,Loss">
            <link rel="canonical" href="https://example.org/blog/hope/">
          </head><body>
            <div class="post-tags"><a href="/t/faith">Faith</a><a href="/t/grief">Grief</a></div>
          </body></html>"#;
        let ctx = PageContext::from_html(html, None);
        assert_eq!(ctx.kind, ContextKind::Ambient);
        assert_eq!(ctx.title, "Finding hope after loss");
        assert_eq!(ctx.description, "A short reflection.");
        let tags: Vec<_> = ctx.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["Faith", "Grief", "Hope", "Loss"]);
        assert_eq!(ctx.identity_url, "https://example.org/blog/hope");
        assert_eq!(ctx.identity_slug, "hope");
    }

    #[test]
    fn html_without_metadata_is_blank() {
        let ctx = PageContext::from_html("<p>nothing here</p>", None);
        assert!(ctx.tags.is_empty());
        assert!(ctx.title.trim().is_empty());
        assert!(ctx.identity_url.is_empty());
    }
}
