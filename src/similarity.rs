// src/similarity.rs
//! Similarity scoring between a page context and a candidate post.
//!
//! score = tag term + token term (ambient contexts only) + recency term.
//!
//! - Tag term: either a fixed weight per shared tag, or `weight * |A∩B| / |A∪B|`.
//!   No shared tags gives 0; more shared tags never lowers the term.
//! - Token term: Jaccard over lower-cased title words, times `token_weight`.
//! - Recency term: at most `RECENCY_EPSILON * weight`, far below the smallest
//!   non-zero tag increment, so it only orders otherwise-equal candidates.
//!
//! The score is a pure function of (context, candidate, config).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

use crate::context::{ContextKind, PageContext};
use crate::post::Post;

pub const DEFAULT_TAG_WEIGHT: f64 = 2.0;
pub const DEFAULT_TOKEN_WEIGHT: f64 = 1.0;

pub const RECENCY_EPSILON: f64 = 1e-9;
/// Timestamps are clamped to this horizon (ms, year 2286) before scaling.
pub const RECENCY_HORIZON_MS: i64 = 10_000_000_000_000;

/// How shared tags turn into score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TagWeighting {
    /// `weight` per candidate tag also present in the context.
    PerSharedTag { weight: f64 },
    /// `weight * |A∩B| / |A∪B|` over tag sets, with `0/0 = 0`.
    Jaccard { weight: f64 },
}

impl Default for TagWeighting {
    fn default() -> Self {
        TagWeighting::PerSharedTag {
            weight: DEFAULT_TAG_WEIGHT,
        }
    }
}

impl TagWeighting {
    pub fn weight(&self) -> f64 {
        match self {
            TagWeighting::PerSharedTag { weight } | TagWeighting::Jaccard { weight } => *weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weighting: TagWeighting,
    pub token_weight: f64,
    pub recency: bool,
    /// Compare tags case-insensitively.
    pub fold_case: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weighting: TagWeighting::default(),
            token_weight: DEFAULT_TOKEN_WEIGHT,
            recency: false,
            fold_case: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ScoreBreakdown {
    tags: f64,
    tokens: f64,
    recency: f64,
}

impl ScoreBreakdown {
    fn total(&self) -> f64 {
        self.tags + self.tokens + self.recency
    }
}

/// `|A∩B| / |A∪B|`, with `0/0 = 0`.
pub fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Split on non-word characters, lower-case, drop empties.
pub fn tokenize(input: &str) -> HashSet<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\W+").expect("tokenizer regex"));
    RE.split(input)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Monotonically increasing in `published_at`, bounded by `RECENCY_EPSILON * scale`.
pub fn recency_term(published_at: i64, scale: f64) -> f64 {
    let clamped = published_at.clamp(0, RECENCY_HORIZON_MS) as f64;
    RECENCY_EPSILON * scale * (clamped / RECENCY_HORIZON_MS as f64)
}

/// Scores candidates against one context. Context-side sets are built once.
#[derive(Debug)]
pub struct Scorer {
    cfg: ScoringConfig,
    kind: ContextKind,
    ctx_tags: HashSet<String>,
    ctx_tokens: HashSet<String>,
}

impl Scorer {
    pub fn new(ctx: &PageContext, cfg: ScoringConfig) -> Self {
        let ctx_tags = ctx.tags.iter().map(|t| fold(t, cfg.fold_case)).collect();
        let ctx_tokens = match ctx.kind {
            ContextKind::Ambient => tokenize(&ctx.title),
            ContextKind::Identified => HashSet::new(),
        };
        Self {
            cfg,
            kind: ctx.kind,
            ctx_tags,
            ctx_tokens,
        }
    }

    fn breakdown(&self, post: &Post) -> ScoreBreakdown {
        let tags = match self.cfg.weighting {
            TagWeighting::PerSharedTag { weight } => {
                let shared = post
                    .tags
                    .iter()
                    .filter(|t| self.ctx_tags.contains(&fold(t, self.cfg.fold_case)))
                    .count();
                shared as f64 * weight
            }
            TagWeighting::Jaccard { weight } => {
                let cand: HashSet<String> = post
                    .tags
                    .iter()
                    .map(|t| fold(t, self.cfg.fold_case))
                    .collect();
                weight * jaccard(&self.ctx_tags, &cand)
            }
        };

        let tokens = match self.kind {
            ContextKind::Ambient if self.cfg.token_weight > 0.0 => {
                self.cfg.token_weight * jaccard(&self.ctx_tokens, &tokenize(&post.title))
            }
            _ => 0.0,
        };

        let recency = if self.cfg.recency {
            recency_term(post.published_at, self.cfg.weighting.weight())
        } else {
            0.0
        };

        ScoreBreakdown {
            tags,
            tokens,
            recency,
        }
    }

    pub fn score(&self, post: &Post) -> f64 {
        self.breakdown(post).total()
    }
}

/// One-shot scoring helper.
pub fn score(ctx: &PageContext, post: &Post, cfg: ScoringConfig) -> f64 {
    Scorer::new(ctx, cfg).score(post)
}

fn fold(tag: &str, fold_case: bool) -> String {
    if fold_case {
        tag.to_lowercase()
    } else {
        tag.to_string()
    }
}
