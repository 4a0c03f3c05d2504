//! Related-posts service: binary entrypoint
//! Boots the Axum HTTP server with the related/topics routes, shared engine
//! state, CORS and (when available) the Prometheus `/metrics` route.

use shuttle_axum::ShuttleAxum;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use related_posts::config::{DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
use related_posts::engine::start_hot_reload_thread;
use related_posts::metrics::Metrics;
use related_posts::{api, AppState};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - RELATED_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("RELATED_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("related=info,ingest=info,telemetry=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let state = AppState::from_env()?;

    // If hot reload is enabled, spawn background watcher
    let path = std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    start_hot_reload_thread(state.engine.clone(), path);

    let max_items = state.engine.with(|e| e.config().engine.max_items);
    let mut router = api::router(state);
    match Metrics::init(max_items) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
    }

    Ok(router.into())
}
