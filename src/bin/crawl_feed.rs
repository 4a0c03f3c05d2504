//! Crawl a blog's HTML index and write a static related-posts feed.
//!
//! Env: CRAWL_BASE_URL (required), CRAWL_INDEX_PATH (default `/blog`),
//! CRAWL_OUTPUT (default `recs.json`), CRAWL_DELAY_MS (default 200).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

use related_posts::crawl::{
    write_feed, CrawlConfig, Crawler, HttpFetcher, DEFAULT_INDEX_PATH, DEFAULT_OUTPUT,
};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crawl=info,warn")),
        )
        .compact()
        .init();

    let base = std::env::var("CRAWL_BASE_URL").context("CRAWL_BASE_URL is not set")?;
    let base = Url::parse(base.trim()).context("CRAWL_BASE_URL is not a valid URL")?;

    let mut cfg = CrawlConfig::new(base);
    cfg.index_path = env_or("CRAWL_INDEX_PATH", DEFAULT_INDEX_PATH);
    if let Some(ms) = std::env::var("CRAWL_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        cfg.delay = Duration::from_millis(ms);
    }
    let output = PathBuf::from(env_or("CRAWL_OUTPUT", DEFAULT_OUTPUT));

    let posts = Crawler::new(HttpFetcher::default(), cfg).run().await?;
    write_feed(&output, &posts)?;

    println!("Wrote {} posts to {}", posts.len(), output.display());
    Ok(())
}
