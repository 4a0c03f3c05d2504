// src/telemetry.rs
//! Best-effort usage events. Sending happens on a spawned task; failures are
//! logged and counted, never returned to the request that produced the event.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::context::PageContext;

pub const EVENT_RELATED_SERVED: &str = "related_served";
pub const EVENT_TOPICS_SERVED: &str = "topics_served";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventContext {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub properties: BTreeMap<String, serde_json::Value>,
    pub context: EventContext,
    pub ts: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(event: &str, ctx: &PageContext) -> Self {
        Self {
            event: event.to_string(),
            properties: BTreeMap::new(),
            context: EventContext {
                url: ctx.identity_url.clone(),
                title: ctx.title.clone(),
            },
            ts: Utc::now(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send(&self, ev: &TelemetryEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// POSTs events as JSON to a collector endpoint.
#[derive(Clone)]
pub struct HttpSink {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait::async_trait]
impl TelemetrySink for HttpSink {
    async fn send(&self, ev: &TelemetryEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .timeout(self.timeout)
            .json(ev)
            .send()
            .await
            .context("telemetry post")?
            .error_for_status()
            .context("telemetry non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Discards every event. Used when no collector is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait::async_trait]
impl TelemetrySink for NoopSink {
    async fn send(&self, _ev: &TelemetryEvent) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Fire-and-forget: spawn the send on the current Tokio runtime. Outside a
/// runtime the event is dropped with a debug log.
pub fn emit(sink: Arc<dyn TelemetrySink>, ev: TelemetryEvent) -> Option<JoinHandle<()>> {
    let Ok(rt) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(target: "telemetry", event = %ev.event, "no runtime; event dropped");
        return None;
    };
    Some(rt.spawn(async move {
        if let Err(e) = sink.send(&ev).await {
            tracing::warn!(target: "telemetry", error = ?e, sink = sink.name(), "telemetry send failed");
            counter!("telemetry_errors_total").increment(1);
        } else {
            counter!("telemetry_events_total").increment(1);
        }
    }))
}
