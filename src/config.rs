// src/config.rs
//! Engine configuration (TOML), with env overrides.
//!
//! ```toml
//! [engine]
//! site_base = "https://www.example.org"
//! max_items = 3
//! max_topics = 6
//! max_posts_per_topic = 3
//! allowed_feed_hosts = ["feeds.example.org"]             # besides site_base / RELATED_FEED_URL
//! max_feed_bytes = 5242880
//! fetch_timeout_secs = 10
//!
//! [scoring]
//! weighting = { mode = "per_shared_tag", weight = 2.0 }   # or mode = "jaccard"
//! token_weight = 1.0
//! recency = false
//! fold_case = false
//!
//! [[topics]]                                              # replaces the built-in taxonomy
//! id = "loss-grief"
//! title = "Loss & Grief"
//! description = "..."
//! match_tags = ["Loss", "Grief"]
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rank::DEFAULT_MAX_ITEMS;
use crate::similarity::{ScoringConfig, TagWeighting, DEFAULT_TAG_WEIGHT, DEFAULT_TOKEN_WEIGHT};
use crate::topics::{TopicDefinition, TopicLimits, DEFAULT_MAX_POSTS_PER_TOPIC, DEFAULT_MAX_TOPICS};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/related.toml";

pub const ENV_CONFIG_PATH: &str = "RELATED_CONFIG_PATH";
pub const ENV_MAX_ITEMS: &str = "RELATED_MAX_ITEMS";
pub const ENV_SITE_BASE: &str = "RELATED_SITE_BASE";

pub const DEFAULT_MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Base used to resolve site-relative post URLs.
    pub site_base: Option<String>,
    pub max_items: usize,
    pub max_topics: usize,
    pub max_posts_per_topic: usize,
    /// Extra hosts a `feed=` URL may point at. The site_base host and the
    /// default feed's host are always accepted.
    pub allowed_feed_hosts: Vec<String>,
    /// Upper bound on a fetched feed body.
    pub max_feed_bytes: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            site_base: None,
            max_items: DEFAULT_MAX_ITEMS,
            max_topics: DEFAULT_MAX_TOPICS,
            max_posts_per_topic: DEFAULT_MAX_POSTS_PER_TOPIC,
            allowed_feed_hosts: Vec::new(),
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub scoring: ScoringConfig,
    /// Empty means "use the built-in taxonomy".
    pub topics: Vec<TopicDefinition>,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: EngineConfig = toml::from_str(s).context("parsing engine config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the path from `RELATED_CONFIG_PATH` (must exist when set), else
    /// `config/related.toml` if present, else defaults. Env overrides apply last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
                if pb.exists() {
                    Self::load_from(&pb)?
                } else {
                    tracing::info!(target: "related", "no engine config file, using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides(
            std::env::var(ENV_MAX_ITEMS).ok(),
            std::env::var(ENV_SITE_BASE).ok(),
        );
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self, max_items: Option<String>, site_base: Option<String>) {
        if let Some(n) = max_items.and_then(|s| s.trim().parse::<usize>().ok()) {
            self.engine.max_items = n;
        }
        if let Some(b) = site_base.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            self.engine.site_base = Some(b);
        }
    }

    /// Replace nonsensical numbers with defaults rather than failing.
    fn sanitize(&mut self) {
        let w = self.scoring.weighting.weight();
        if !(w.is_finite() && w > 0.0) {
            self.scoring.weighting = match self.scoring.weighting {
                TagWeighting::PerSharedTag { .. } => TagWeighting::PerSharedTag {
                    weight: DEFAULT_TAG_WEIGHT,
                },
                TagWeighting::Jaccard { .. } => TagWeighting::Jaccard { weight: 1.0 },
            };
        }
        let tw = self.scoring.token_weight;
        if !(tw.is_finite() && tw >= 0.0) {
            self.scoring.token_weight = DEFAULT_TOKEN_WEIGHT;
        }
        self.topics.retain(|t| !t.id.trim().is_empty() && !t.match_tags.is_empty());
        if self.engine.max_feed_bytes == 0 {
            self.engine.max_feed_bytes = DEFAULT_MAX_FEED_BYTES;
        }
        if self.engine.fetch_timeout_secs == 0 {
            self.engine.fetch_timeout_secs = DEFAULT_FETCH_TIMEOUT_SECS;
        }
        for host in &mut self.engine.allowed_feed_hosts {
            *host = host.trim().to_ascii_lowercase();
        }
        self.engine.allowed_feed_hosts.retain(|h| !h.is_empty());
    }

    /// Whether a caller-supplied feed URL may be fetched server-side: http(s)
    /// only, and the host must be the site's own, the default feed's, or one
    /// listed in `allowed_feed_hosts`.
    pub fn feed_url_allowed(&self, feed: &str, default_feed: Option<&str>) -> bool {
        let Some(host) = http_host(feed) else {
            return false;
        };
        let site_host = self.engine.site_base.as_deref().and_then(http_host);
        let default_host = default_feed.and_then(http_host);
        site_host.as_deref() == Some(host.as_str())
            || default_host.as_deref() == Some(host.as_str())
            || self.engine.allowed_feed_hosts.iter().any(|h| h.trim().eq_ignore_ascii_case(&host))
    }

    pub fn topic_limits(&self) -> TopicLimits {
        TopicLimits {
            max_topics: self.engine.max_topics,
            max_posts_per_topic: self.engine.max_posts_per_topic,
        }
    }
}

fn http_host(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(|h| h.to_ascii_lowercase())
}
