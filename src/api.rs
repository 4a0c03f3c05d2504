// src/api.rs
//! HTTP surface for the widgets: related posts for the page being viewed and
//! the browse-by-topic view. Feeds are fetched per request (or supplied
//! inline in POST bodies); the engine itself never does I/O.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::context::PageContext;
use crate::engine::{EngineHandle, RelatedEngine, RelatedQuery};
use crate::ingest::load_posts;
use crate::ingest::providers::{HttpFeed, StaticFeed};
use crate::ingest::types::FeedSource;
use crate::post::Post;
use crate::rank::RelatedOutcome;
use crate::telemetry::{
    emit, HttpSink, NoopSink, TelemetryEvent, TelemetrySink, EVENT_RELATED_SERVED,
    EVENT_TOPICS_SERVED,
};
use crate::topics::{TopicBucket, TopicLimits};

pub const ENV_FEED_URL: &str = "RELATED_FEED_URL";
pub const ENV_TELEMETRY_URL: &str = "RELATED_TELEMETRY_URL";

const RELATED_MOUNT: &str = "related-posts";
const TOPICS_MOUNT: &str = "felt-widget";
const DEFAULT_THEME: &str = "light";

const MSG_MISSING_FEED: &str = "Missing feed URL.";
const MSG_FEED_NOT_ALLOWED: &str = "Feed URL not allowed.";
const MSG_RELATED_EMPTY: &str = "No related posts found.";
const MSG_RELATED_UNAVAILABLE: &str = "Unable to load related posts.";
const MSG_TOPICS_EMPTY: &str = "No topics found.";
const MSG_TOPICS_UNAVAILABLE: &str = "Unable to load resources right now. Please try again later.";

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub client: reqwest::Client,
    pub telemetry: Arc<dyn TelemetrySink>,
    /// Used when a request names no feed.
    pub default_feed: Option<String>,
}

impl AppState {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            client: reqwest::Client::new(),
            telemetry: Arc::new(NoopSink),
            default_feed: None,
        }
    }

    /// Engine from `EngineConfig::load_default`, default feed from
    /// `RELATED_FEED_URL`, telemetry collector from `RELATED_TELEMETRY_URL`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut state = Self::new(EngineHandle::new(RelatedEngine::from_env()?));
        state.default_feed = non_empty(std::env::var(ENV_FEED_URL).ok());
        if let Some(url) = non_empty(std::env::var(ENV_TELEMETRY_URL).ok()) {
            state.telemetry = Arc::new(HttpSink::new(url).with_client(state.client.clone()));
        }
        Ok(state)
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn with_default_feed(mut self, url: impl Into<String>) -> Self {
        self.default_feed = Some(url.into());
        self
    }

    /// A caller-named feed must pass the host allow-list; the configured
    /// default feed is trusted as is.
    fn http_feed(&self, requested: Option<&str>) -> Result<HttpFeed, FeedRefusal> {
        let requested = non_empty(requested.map(str::to_string));
        let (url, limits) = self.engine.with(|e| {
            let cfg = e.config();
            let url = match requested {
                Some(url) if cfg.feed_url_allowed(&url, self.default_feed.as_deref()) => Ok(url),
                Some(url) => {
                    tracing::warn!(target: "ingest", feed = %url, "feed host not allowed");
                    Err(FeedRefusal::NotAllowed)
                }
                None => self.default_feed.clone().ok_or(FeedRefusal::Missing),
            };
            (url, (cfg.engine.max_feed_bytes, cfg.engine.fetch_timeout_secs))
        });
        let (max_bytes, timeout_secs) = limits;
        Ok(HttpFeed::new(url?)
            .with_client(self.client.clone())
            .with_max_bytes(max_bytes)
            .with_timeout(timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedRefusal {
    Missing,
    NotAllowed,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/related", get(related_get).post(related_post))
        .route("/topics", get(topics_get).post(topics_post))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Widget options, as query parameters (GET) or body fields (POST).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WidgetParams {
    pub mount: Option<String>,
    pub theme: Option<String>,
    /// Feed URL.
    pub feed: Option<String>,
    /// Current item identity (slug or URL fragment).
    pub current: Option<String>,
    pub max_items: Option<usize>,
    pub max_topics: Option<usize>,
    pub max_posts_per_topic: Option<usize>,
    /// `false` suppresses usage events for this request.
    pub telemetry: Option<bool>,
}

/// Page metadata sent by the embedding page. `html` wins when present.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContextBody {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub url: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WidgetRequest {
    #[serde(flatten)]
    pub params: WidgetParams,
    /// Inline feed: a JSON feed value, or a string holding JSON or RSS.
    pub feed_document: Option<serde_json::Value>,
    pub context: Option<ContextBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetStatus {
    Ok,
    Empty,
    Error,
}

#[derive(Debug, Serialize)]
pub struct RelatedResponse {
    pub mount: String,
    pub theme: String,
    pub status: WidgetStatus,
    pub items: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    pub mount: String,
    pub theme: String,
    pub status: WidgetStatus,
    pub topics: Vec<TopicBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    mount: String,
    theme: String,
    status: WidgetStatus,
    message: &'static str,
}

/// Request-level failures. All render the widget's fallback message.
#[derive(Debug)]
pub enum ApiError {
    MissingFeed { mount: String, theme: String },
    FeedNotAllowed { mount: String, theme: String },
    FeedUnavailable { mount: String, theme: String, message: &'static str },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, mount, theme, message) = match self {
            ApiError::MissingFeed { mount, theme } => {
                (StatusCode::BAD_REQUEST, mount, theme, MSG_MISSING_FEED)
            }
            ApiError::FeedNotAllowed { mount, theme } => {
                (StatusCode::BAD_REQUEST, mount, theme, MSG_FEED_NOT_ALLOWED)
            }
            ApiError::FeedUnavailable {
                mount,
                theme,
                message,
            } => (StatusCode::BAD_GATEWAY, mount, theme, message),
        };
        let body = ErrorBody {
            mount,
            theme,
            status: WidgetStatus::Error,
            message,
        };
        (code, Json(body)).into_response()
    }
}

fn mount_and_theme(p: &WidgetParams, default_mount: &str) -> (String, String) {
    (
        non_empty(p.mount.clone()).unwrap_or_else(|| default_mount.to_string()),
        non_empty(p.theme.clone()).unwrap_or_else(|| DEFAULT_THEME.to_string()),
    )
}

/// Pick the feed: inline document first, then the named URL, then the default.
fn feed_source(
    state: &AppState,
    params: &WidgetParams,
    inline: Option<serde_json::Value>,
    mount: &str,
    theme: &str,
) -> Result<Box<dyn FeedSource>, ApiError> {
    match inline {
        Some(serde_json::Value::String(doc)) => Ok(Box::new(StaticFeed::new(doc))),
        Some(v) => Ok(Box::new(StaticFeed::from_json(&v))),
        None => match state.http_feed(params.feed.as_deref()) {
            Ok(f) => Ok(Box::new(f)),
            Err(FeedRefusal::Missing) => Err(ApiError::MissingFeed {
                mount: mount.to_string(),
                theme: theme.to_string(),
            }),
            Err(FeedRefusal::NotAllowed) => Err(ApiError::FeedNotAllowed {
                mount: mount.to_string(),
                theme: theme.to_string(),
            }),
        },
    }
}

fn ambient_context(body: ContextBody, engine: &RelatedEngine) -> PageContext {
    if let Some(html) = body.html.as_deref().filter(|h| !h.trim().is_empty()) {
        return PageContext::from_html(html, engine.site_base());
    }
    let ctx = PageContext::ambient(&body.title, &body.description, &body.keywords);
    match body.url.as_deref() {
        Some(u) => ctx.with_page_url(u, engine.site_base()),
        None => ctx,
    }
}

/* ----------------------------
Related posts
---------------------------- */

async fn related_get(
    State(state): State<AppState>,
    Query(params): Query<WidgetParams>,
) -> Result<Json<RelatedResponse>, ApiError> {
    serve_related(
        &state,
        WidgetRequest {
            params,
            ..WidgetRequest::default()
        },
    )
    .await
}

async fn related_post(
    State(state): State<AppState>,
    Json(req): Json<WidgetRequest>,
) -> Result<Json<RelatedResponse>, ApiError> {
    serve_related(&state, req).await
}

async fn serve_related(
    state: &AppState,
    req: WidgetRequest,
) -> Result<Json<RelatedResponse>, ApiError> {
    let WidgetRequest {
        params,
        feed_document,
        context,
    } = req;
    let (mount, theme) = mount_and_theme(&params, RELATED_MOUNT);

    let source = feed_source(state, &params, feed_document, &mount, &theme)?;

    let site_base = state.engine.with(|e| e.site_base().cloned());
    let posts = load_posts(source.as_ref(), site_base.as_ref())
        .await
        .map_err(|_| ApiError::FeedUnavailable {
            mount: mount.clone(),
            theme: theme.clone(),
            message: MSG_RELATED_UNAVAILABLE,
        })?;

    let (ctx, outcome) = state.engine.with(|engine| {
        let query = RelatedQuery {
            identity: params.current.clone(),
            ambient: context.map(|c| ambient_context(c, engine)),
            max_items: params.max_items,
        };
        let ctx = engine.resolve_context(&posts, &query);
        let max_items = query.max_items.unwrap_or(engine.config().engine.max_items);
        let outcome = engine.rank(&posts, &ctx, max_items);
        (ctx, outcome)
    });

    let (status, items, message) = match outcome {
        RelatedOutcome::Ranked(items) => (
            WidgetStatus::Ok,
            items.into_iter().map(|c| c.post).collect::<Vec<_>>(),
            None,
        ),
        RelatedOutcome::Empty => (
            WidgetStatus::Empty,
            Vec::new(),
            Some(MSG_RELATED_EMPTY.to_string()),
        ),
    };

    if params.telemetry != Some(false) {
        let ev = TelemetryEvent::new(EVENT_RELATED_SERVED, &ctx)
            .with("mount", mount.as_str())
            .with("count", items.len())
            .with("kind", format!("{:?}", ctx.kind).to_lowercase());
        emit(state.telemetry.clone(), ev);
    }

    Ok(Json(RelatedResponse {
        mount,
        theme,
        status,
        items,
        message,
    }))
}

/* ----------------------------
Topics
---------------------------- */

async fn topics_get(
    State(state): State<AppState>,
    Query(params): Query<WidgetParams>,
) -> Result<Json<TopicsResponse>, ApiError> {
    serve_topics(
        &state,
        WidgetRequest {
            params,
            ..WidgetRequest::default()
        },
    )
    .await
}

async fn topics_post(
    State(state): State<AppState>,
    Json(req): Json<WidgetRequest>,
) -> Result<Json<TopicsResponse>, ApiError> {
    serve_topics(&state, req).await
}

async fn serve_topics(state: &AppState, req: WidgetRequest) -> Result<Json<TopicsResponse>, ApiError> {
    let WidgetRequest {
        params,
        feed_document,
        context,
    } = req;
    let (mount, theme) = mount_and_theme(&params, TOPICS_MOUNT);

    let source = feed_source(state, &params, feed_document, &mount, &theme)?;

    let site_base = state.engine.with(|e| e.site_base().cloned());
    let posts = load_posts(source.as_ref(), site_base.as_ref())
        .await
        .map_err(|_| ApiError::FeedUnavailable {
            mount: mount.clone(),
            theme: theme.clone(),
            message: MSG_TOPICS_UNAVAILABLE,
        })?;

    let (ctx, topics) = state.engine.with(|engine| {
        let configured = engine.config().topic_limits();
        let limits = TopicLimits {
            max_topics: params.max_topics.unwrap_or(configured.max_topics),
            max_posts_per_topic: params
                .max_posts_per_topic
                .unwrap_or(configured.max_posts_per_topic),
        };
        let ctx = context
            .map(|c| ambient_context(c, engine))
            .unwrap_or_default();
        (ctx, engine.topics(&posts, Some(limits)))
    });

    let (status, message) = if topics.is_empty() {
        (WidgetStatus::Empty, Some(MSG_TOPICS_EMPTY.to_string()))
    } else {
        (WidgetStatus::Ok, None)
    };

    if params.telemetry != Some(false) {
        let ev = TelemetryEvent::new(EVENT_TOPICS_SERVED, &ctx)
            .with("mount", mount.as_str())
            .with("topics", topics.len());
        emit(state.telemetry.clone(), ev);
    }

    Ok(Json(TopicsResponse {
        mount,
        theme,
        status,
        topics,
        message,
    }))
}
