// src/ingest/providers/mod.rs
pub mod http_feed;
pub mod static_feed;

pub use http_feed::HttpFeed;
pub use static_feed::StaticFeed;
