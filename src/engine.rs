// src/engine.rs
//! # Related-content engine
//! Pure, synchronous matching over one in-memory feed snapshot: resolve the
//! query context, score every candidate, select the top items; or bucket the
//! snapshot by topic. No I/O here.

use metrics::{counter, histogram};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::info;
use url::Url;

use crate::config::EngineConfig;
use crate::context::{clean_identity, resolve_current, PageContext};
use crate::ingest::normalize_all;
use crate::ingest::types::RawRecord;
use crate::post::{canonicalize_url, Post};
use crate::rank::{select, RelatedOutcome, ScoredCandidate};
use crate::similarity::Scorer;
use crate::topics::{classify, default_topics, TopicBucket, TopicDefinition, TopicLimits};

// Dev logging gate: RELATED_DEV_LOG=1 AND dev env (debug or SHUTTLE_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("RELATED_DEV_LOG").ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    is_dev_env()
}

fn is_dev_env() -> bool {
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Short, stable, non-reversible id for page URLs in logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// What the caller knows about the page being viewed.
#[derive(Debug, Clone, Default)]
pub struct RelatedQuery {
    /// Explicit current-item identity (slug or URL fragment).
    pub identity: Option<String>,
    /// Ambient page metadata, used when no identity resolves.
    pub ambient: Option<PageContext>,
    /// Overrides the configured maximum.
    pub max_items: Option<usize>,
}

impl RelatedQuery {
    pub fn for_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            ..Self::default()
        }
    }

    pub fn for_context(ctx: PageContext) -> Self {
        Self {
            ambient: Some(ctx),
            ..Self::default()
        }
    }

    pub fn limit(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

#[derive(Debug)]
pub struct RelatedEngine {
    cfg: EngineConfig,
    site_base: Option<Url>,
    topics: Vec<TopicDefinition>,
}

impl RelatedEngine {
    pub fn new(cfg: EngineConfig) -> anyhow::Result<Self> {
        let site_base = match cfg.engine.site_base.as_deref() {
            Some(b) => Some(
                Url::parse(b).map_err(|e| anyhow::anyhow!("invalid site_base `{}`: {}", b, e))?,
            ),
            None => None,
        };
        let topics = if cfg.topics.is_empty() {
            default_topics()
        } else {
            cfg.topics.clone()
        };
        Ok(Self {
            cfg,
            site_base,
            topics,
        })
    }

    /// Load via `EngineConfig::load_default` (env path, file, defaults).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(EngineConfig::load_default()?)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        Self::new(EngineConfig::from_toml_str(toml_str)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn site_base(&self) -> Option<&Url> {
        self.site_base.as_ref()
    }

    pub fn normalize(&self, records: Vec<RawRecord>) -> Vec<Post> {
        normalize_all(records, self.site_base())
    }

    /// Build the query context: the identified current post when the identity
    /// resolves, otherwise the ambient context (or a blank one).
    pub fn resolve_context(&self, posts: &[Post], query: &RelatedQuery) -> PageContext {
        if let Some(id) = query.identity.as_deref() {
            if let Some(current) = resolve_current(posts, id) {
                return PageContext::for_post(current);
            }
            if !clean_identity(id).is_empty() {
                tracing::debug!(target: "related", "current item not in feed; ambient ranking");
            }
        }
        let mut ctx = query.ambient.clone().unwrap_or_default();
        ctx.identity_url = canonicalize_url(&ctx.identity_url, self.site_base());
        ctx
    }

    /// Score all posts against `ctx` and select the top items.
    pub fn rank(&self, posts: &[Post], ctx: &PageContext, max_items: usize) -> RelatedOutcome {
        let scorer = Scorer::new(ctx, self.cfg.scoring);
        let candidates: Vec<ScoredCandidate> = posts
            .iter()
            .enumerate()
            .map(|(index, post)| ScoredCandidate {
                score: scorer.score(post),
                post: post.clone(),
                index,
            })
            .collect();

        histogram!("related_candidates").record(candidates.len() as f64);
        let outcome = select(candidates, &ctx.identity_url, max_items);

        counter!("related_requests_total").increment(1);
        if outcome.is_empty() {
            counter!("related_empty_total").increment(1);
        }
        dev_log_related(ctx, &outcome);
        outcome
    }

    /// Resolve context and rank in one call.
    pub fn related(&self, posts: &[Post], query: &RelatedQuery) -> RelatedOutcome {
        let ctx = self.resolve_context(posts, query);
        let max_items = query.max_items.unwrap_or(self.cfg.engine.max_items);
        self.rank(posts, &ctx, max_items)
    }

    /// Topic buckets with the configured limits, or `limits` when given.
    pub fn topics(&self, posts: &[Post], limits: Option<TopicLimits>) -> Vec<TopicBucket> {
        let limits = limits.unwrap_or_else(|| self.cfg.topic_limits());
        classify(posts, &self.topics, limits, self.cfg.scoring.fold_case)
    }
}

/// Minimal, anonymized dev logger for ranking results.
fn dev_log_related(ctx: &PageContext, outcome: &RelatedOutcome) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(&ctx.identity_url);
    let scores: Vec<String> = match outcome {
        RelatedOutcome::Ranked(items) => items.iter().map(|c| format!("{:.3}", c.score)).collect(),
        RelatedOutcome::Empty => Vec::new(),
    };
    // Never log raw URLs. Only hashed id + scores.
    info!(
        target: "related",
        %id,
        kind = ?ctx.kind,
        tags = ctx.tags.len(),
        scores = ?scores,
        "ranked"
    );
}

/* ----------------------------
Thread-safe handle + hot reload
---------------------------- */

/// A threadsafe handle that can hot-reload the underlying engine in dev/local.
/// - Enable by setting RELATED_HOT_RELOAD=1
/// - Dev-gated: active only if cfg!(debug_assertions) OR SHUTTLE_ENV is "local"/"development".
#[derive(Clone, Debug)]
pub struct EngineHandle {
    inner: Arc<RwLock<RelatedEngine>>,
}

impl EngineHandle {
    pub fn new(engine: RelatedEngine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    /// Run `f` against the current engine. A poisoned lock still yields the
    /// last engine; reads never mutate it.
    pub fn with<R>(&self, f: impl FnOnce(&RelatedEngine) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&*guard)
    }

    pub fn replace(&self, engine: RelatedEngine) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = engine;
    }
}

/// Returns true if we should enable hot reload (dev/local only).
fn hot_reload_enabled() -> bool {
    let want = std::env::var("RELATED_HOT_RELOAD")
        .ok()
        .map(|v| v == "1")
        .unwrap_or(false);
    if !want {
        return false;
    }
    cfg!(debug_assertions) || is_dev_env()
}

/// Start a simple polling watcher on `path` to hot-reload into `handle`.
/// Polls mtime every 2s. Invalid configs are logged and skipped.
pub fn start_hot_reload_thread(handle: EngineHandle, path: PathBuf) {
    if !hot_reload_enabled() {
        return;
    }

    thread::spawn(move || {
        let poll = Duration::from_secs(2);
        let mut last_mtime: Option<SystemTime> = None;

        loop {
            if let Ok(mtime) = fs::metadata(&path).and_then(|m| m.modified()) {
                let changed = match last_mtime {
                    None => {
                        last_mtime = Some(mtime);
                        false
                    }
                    Some(prev) => mtime > prev,
                };
                if changed {
                    match EngineConfig::load_from(&path).and_then(RelatedEngine::new) {
                        Ok(engine) => {
                            handle.replace(engine);
                            info!(target: "related", "engine config reloaded");
                        }
                        Err(e) => {
                            tracing::warn!(target: "related", error = ?e, "config reload skipped")
                        }
                    }
                    last_mtime = Some(mtime);
                }
            }
            thread::sleep(poll);
        }
    });
}
