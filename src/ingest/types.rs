// src/ingest/types.rs
//! Raw, loosely-typed feed shapes. Everything here is tolerant: a field with an
//! unexpected shape deserializes as `Loose::Other` instead of failing the record.

use anyhow::Result;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// Either the shape we expect, or anything else (ignored).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Loose<T> {
    Value(T),
    Other(IgnoredAny),
}

impl<T> Loose<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Loose::Value(v) => Some(v),
            Loose::Other(_) => None,
        }
    }
}

/// Tags come as plain strings or as `{ "name": "..." }` objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTag {
    Plain(String),
    Named { name: String },
    Other(IgnoredAny),
}

impl RawTag {
    pub fn name(&self) -> Option<&str> {
        match self {
            RawTag::Plain(s) | RawTag::Named { name: s } if !s.trim().is_empty() => {
                Some(s.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMedia {
    WithUrl { url: String },
    Other(IgnoredAny),
}

/// Publish time as number or numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    /// Epoch milliseconds; anything unusable is 0 ("oldest").
    pub fn millis(&self) -> i64 {
        let v = match self {
            RawTimestamp::Int(i) => Some(*i),
            RawTimestamp::Float(f) => float_millis(*f),
            RawTimestamp::Text(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().and_then(float_millis))
            }
        };
        v.filter(|ms| *ms > 0).unwrap_or(0)
    }
}

fn float_millis(f: f64) -> Option<i64> {
    if f.is_finite() && f >= 0.0 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// One raw feed record as it appears on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    pub title: Option<Loose<String>>,
    #[serde(rename = "fullUrl")]
    pub full_url: Option<Loose<String>>,
    pub url: Option<Loose<String>>,
    pub tags: Option<Loose<Vec<RawTag>>>,
    pub categories: Option<Loose<Vec<RawTag>>>,
    pub excerpt: Option<Loose<String>>,
    pub body: Option<Loose<String>>,
    #[serde(rename = "assetUrl")]
    pub asset_url: Option<Loose<String>>,
    pub image: Option<Loose<String>>,
    pub media: Option<Loose<Vec<RawMedia>>>,
    #[serde(rename = "publishOn")]
    pub publish_on: Option<Loose<RawTimestamp>>,
    /// Crawler output spelling; `publishOn` wins when both are present.
    #[serde(rename = "publishedAt")]
    pub published_at: Option<Loose<RawTimestamp>>,
}

impl RawRecord {
    /// Build from any JSON value; non-objects become an all-absent record.
    pub fn from_value(v: serde_json::Value) -> Self {
        if v.is_object() {
            serde_json::from_value(v).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Convenience for producers that already have typed fields (RSS, tests).
    pub fn text(value: impl Into<String>) -> Option<Loose<String>> {
        Some(Loose::Value(value.into()))
    }
}

/// Record written by the crawler; reads back as a `RawRecord`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CrawledPost {
    pub title: String,
    pub url: String,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<i64>,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_records(&self) -> Result<Vec<RawRecord>>;
    fn name(&self) -> &'static str;
}
