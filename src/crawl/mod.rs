// src/crawl/mod.rs
//! Offline crawler that builds a static feed from a blog's HTML: walk the
//! paginated index, dedupe by URL, enrich each post from its own page, and
//! write a JSON list the normalizer reads back.

pub mod parse;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::ingest::types::CrawledPost;
use parse::{parse_index_page, parse_post_details, site_relative, IndexEntry, PostDetails};

pub const DEFAULT_INDEX_PATH: &str = "/blog";
pub const DEFAULT_OUTPUT: &str = "recs.json";
pub const DEFAULT_DELAY_MS: u64 = 200;
/// Upper bound on index pages, in case pagination never ends.
pub const MAX_INDEX_PAGES: usize = 500;

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &Url) -> Result<String>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(15),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_html(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}: non-2xx"))?;
        resp.text().await.context("reading page body")
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base: Url,
    pub index_path: String,
    /// Pause after each post-page fetch.
    pub delay: Duration,
    pub max_index_pages: usize,
}

impl CrawlConfig {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            index_path: DEFAULT_INDEX_PATH.to_string(),
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            max_index_pages: MAX_INDEX_PAGES,
        }
    }
}

pub struct Crawler<F> {
    fetcher: F,
    cfg: CrawlConfig,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(fetcher: F, cfg: CrawlConfig) -> Self {
        Self { fetcher, cfg }
    }

    /// Walk index pages from `index_path` following next links. A page that
    /// was already visited ends the walk. Index fetch errors are fatal.
    pub async fn crawl_index(&self) -> Result<Vec<IndexEntry>> {
        let mut visited: HashSet<Url> = HashSet::new();
        let mut entries = Vec::new();
        let mut next = Some(self.cfg.index_path.clone());

        while let Some(path) = next.take() {
            let url = self
                .cfg
                .base
                .join(&path)
                .map_err(|e| anyhow!("bad index link `{path}`: {e}"))?;
            if !visited.insert(url.clone()) {
                tracing::debug!(target: "crawl", %url, "index page already visited");
                break;
            }
            if visited.len() > self.cfg.max_index_pages {
                tracing::warn!(target: "crawl", pages = visited.len(), "index page limit reached");
                break;
            }

            tracing::info!(target: "crawl", %url, "crawling index");
            let html = self.fetcher.fetch_html(&url).await?;
            let page = parse_index_page(&html, &self.cfg.base);
            counter!("crawl_index_pages_total").increment(1);

            entries.extend(page.posts);
            next = page.next_page;
        }
        Ok(entries)
    }

    /// Fetch one post page. Failures are logged and yield `None`.
    async fn details(&self, entry: &IndexEntry) -> Option<PostDetails> {
        let url = self.cfg.base.join(&entry.url).ok()?;
        match self.fetcher.fetch_html(&url).await {
            Ok(html) => Some(parse_post_details(&html, &self.cfg.base)),
            Err(e) => {
                tracing::warn!(target: "crawl", %url, error = ?e, "post details unavailable");
                counter!("crawl_detail_errors_total").increment(1);
                None
            }
        }
    }

    /// Full crawl: index, dedupe, enrich (with the courtesy delay), relativize.
    pub async fn run(&self) -> Result<Vec<CrawledPost>> {
        let entries = dedupe_by_url(self.crawl_index().await?);
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            tracing::info!(target: "crawl", url = %entry.url, "fetching post detail");
            let details = self.details(&entry).await;
            out.push(to_crawled(entry, details, &self.cfg.base));
            if !self.cfg.delay.is_zero() {
                tokio::time::sleep(self.cfg.delay).await;
            }
        }
        Ok(out)
    }
}

/// First occurrence of each URL wins.
pub fn dedupe_by_url(entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.url.clone()))
        .collect()
}

/// Merge index data with page details. Without details the post keeps its
/// index image and gets no tags.
pub fn to_crawled(entry: IndexEntry, details: Option<PostDetails>, base: &Url) -> CrawledPost {
    let details = details.unwrap_or_default();
    CrawledPost {
        url: site_relative(&entry.url, base),
        title: entry.title,
        tags: details.tags,
        image: details.image.or(entry.image),
        excerpt: entry.excerpt,
        published_at: details.published_at,
    }
}

pub fn write_feed(path: &Path, posts: &[CrawledPost]) -> Result<()> {
    let json = serde_json::to_string_pretty(posts).context("serializing crawled feed")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeSite {
        pages: HashMap<String, String>,
        hits: Mutex<Vec<String>>,
    }

    impl FakeSite {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, h)| (u.to_string(), h.to_string()))
                    .collect(),
                hits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FakeSite {
        async fn fetch_html(&self, url: &Url) -> Result<String> {
            self.hits.lock().unwrap().push(url.to_string());
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| anyhow!("404 {url}"))
        }
    }

    fn cfg() -> CrawlConfig {
        let mut c = CrawlConfig::new(Url::parse("https://site.test").unwrap());
        c.delay = Duration::ZERO;
        c
    }

    #[tokio::test]
    async fn pagination_loop_stops_on_revisit() {
        let site = FakeSite::new(&[
            (
                "https://site.test/blog",
                r#"<a href="/blog/a">A</a><a rel="next" href="/blog?page=2">n</a>"#,
            ),
            (
                "https://site.test/blog?page=2",
                r#"<a href="/blog/b">B</a><a rel="next" href="/blog">n</a>"#,
            ),
        ]);
        let crawler = Crawler::new(site, cfg());
        let entries = crawler.crawl_index().await.unwrap();
        let urls: Vec<_> = entries.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["/blog/a", "/blog/b"]);
        assert_eq!(crawler.fetcher.hits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_detail_keeps_index_data() {
        let site = FakeSite::new(&[
            (
                "https://site.test/blog",
                r#"<article><img src="/a.jpg"><a href="/blog/a">A</a><p class="summary">sum</p></article>
                   <a href="https://site.test/blog/b">B</a>
                   <a href="/blog/a">A again</a>"#,
            ),
            (
                "https://site.test/blog/b",
                r#"<meta name="keywords" content="Hope"><meta property="article:published_time" content="1970-01-01T00:00:02Z">"#,
            ),
        ]);
        let posts = Crawler::new(site, cfg()).run().await.unwrap();
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].title, "A");
        assert!(posts[0].tags.is_empty());
        assert_eq!(posts[0].image.as_deref(), Some("https://site.test/a.jpg"));
        assert_eq!(posts[0].excerpt, "sum");

        assert_eq!(posts[1].url, "/blog/b");
        assert_eq!(posts[1].tags, vec!["Hope"]);
        assert_eq!(posts[1].published_at, Some(2_000));
    }

    #[tokio::test]
    async fn index_failure_is_fatal() {
        let site = FakeSite::new(&[]);
        assert!(Crawler::new(site, cfg()).run().await.is_err());
    }

    #[test]
    fn written_feed_reads_back_through_normalizer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("recs.json");
        let posts = vec![CrawledPost {
            title: "A".into(),
            url: "/blog/a".into(),
            tags: vec!["Grief".into()],
            image: Some("https://site.test/a.jpg".into()),
            excerpt: "Short.".into(),
            published_at: Some(5),
        }];
        write_feed(&path, &posts).unwrap();

        let doc = std::fs::read_to_string(&path).unwrap();
        let records = crate::ingest::parse_feed(&doc).unwrap();
        let normalized = crate::ingest::normalize_all(records, None);
        assert_eq!(normalized[0].url, "/blog/a");
        assert_eq!(normalized[0].tags, vec!["Grief"]);
        assert_eq!(normalized[0].thumbnail, "https://site.test/a.jpg");
        assert_eq!(normalized[0].excerpt, "Short.");
        assert_eq!(normalized[0].published_at, 5);
    }
}
