// src/lib.rs
// Public library surface for the server, the crawler binary and integration tests.

pub mod config;
pub mod context;
pub mod engine;
pub mod post;
pub mod rank;
pub mod similarity;
pub mod topics;

// Feed fetching/parsing and the crawler that produces feeds
pub mod crawl;
pub mod ingest;

// HTTP surface & side channels
pub mod api;
pub mod metrics;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::EngineConfig;
pub use crate::context::{ContextKind, PageContext};
pub use crate::engine::{EngineHandle, RelatedEngine, RelatedQuery};
pub use crate::post::Post;
pub use crate::rank::{RelatedOutcome, ScoredCandidate};
pub use crate::topics::{TopicBucket, TopicDefinition, TopicLimits};
