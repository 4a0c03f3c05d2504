// src/rank.rs
//! Ranking & selection: drop the current item, order by score (stable), truncate.

use serde::Serialize;
use std::cmp::Ordering;

use crate::post::{urls_match, Post};

pub const DEFAULT_MAX_ITEMS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub post: Post,
    pub score: f64,
    /// Position in the original feed; the tie-break on equal scores.
    pub index: usize,
}

/// Outcome of one related-items query. `Empty` is a normal result, not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum RelatedOutcome {
    Ranked(Vec<ScoredCandidate>),
    Empty,
}

impl RelatedOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, RelatedOutcome::Empty)
    }

    pub fn posts(&self) -> Vec<&Post> {
        match self {
            RelatedOutcome::Ranked(items) => items.iter().map(|c| &c.post).collect(),
            RelatedOutcome::Empty => Vec::new(),
        }
    }

    pub fn into_candidates(self) -> Vec<ScoredCandidate> {
        match self {
            RelatedOutcome::Ranked(items) => items,
            RelatedOutcome::Empty => Vec::new(),
        }
    }
}

/// Descending by score; equal scores keep feed order via the index.
fn by_score_then_feed_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.index.cmp(&b.index))
}

/// Exclude `exclude_url` (canonical equality; empty excludes nothing), sort,
/// and keep at most `max_items`.
pub fn select(
    mut candidates: Vec<ScoredCandidate>,
    exclude_url: &str,
    max_items: usize,
) -> RelatedOutcome {
    candidates.retain(|c| !urls_match(&c.post.url, exclude_url));
    candidates.sort_by(by_score_then_feed_order);
    candidates.truncate(max_items);

    if candidates.is_empty() {
        RelatedOutcome::Empty
    } else {
        RelatedOutcome::Ranked(candidates)
    }
}
