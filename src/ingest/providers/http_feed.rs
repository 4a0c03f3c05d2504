use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use std::time::Duration;

use crate::config::{DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_FEED_BYTES};
use crate::ingest::parse_feed;
use crate::ingest::types::{FeedSource, RawRecord};

/// Fetches the feed over HTTP. Transport errors, non-2xx answers, oversized
/// and unparseable bodies all surface as errors: the feed is unavailable.
#[derive(Clone)]
pub struct HttpFeed {
    url: String,
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_bytes: DEFAULT_MAX_FEED_BYTES,
        }
    }

    /// Reuse a shared client (connection pool) across requests.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn read_capped(&self, mut resp: reqwest::Response) -> Result<String> {
        if resp.content_length().is_some_and(|n| n > self.max_bytes as u64) {
            bail!("feed body exceeds {} bytes", self.max_bytes);
        }
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await.context("feed http body")? {
            if buf.len() + chunk.len() > self.max_bytes {
                bail!("feed body exceeds {} bytes", self.max_bytes);
            }
            buf.extend_from_slice(&chunk);
        }
        String::from_utf8(buf).context("feed body is not utf-8")
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let resp = match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, "feed http error");
                counter!("feed_http_errors_total").increment(1);
                return Err(e).context("feed http get()");
            }
        };
        let resp = resp.error_for_status().context("feed non-2xx")?;
        let body = match self.read_capped(resp).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, "feed body rejected");
                counter!("feed_http_errors_total").increment(1);
                return Err(e);
            }
        };
        parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
