use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::parse_feed;
use crate::ingest::types::{FeedSource, RawRecord};

/// A feed document already in memory (fixtures, inline request bodies).
pub struct StaticFeed {
    doc: String,
}

impl StaticFeed {
    pub fn new(doc: impl Into<String>) -> Self {
        Self { doc: doc.into() }
    }

    pub fn from_json(v: &serde_json::Value) -> Self {
        Self { doc: v.to_string() }
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        parse_feed(&self.doc)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
