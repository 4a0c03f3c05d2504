// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use related_posts::api::{self, AppState};
use related_posts::metrics::Metrics;
use related_posts::{EngineConfig, EngineHandle, RelatedEngine};

// Full in-process app: API routes plus `/metrics`.
fn build_app() -> Router {
    let metrics = Metrics::init_default().expect("install prometheus recorder");
    let engine = RelatedEngine::new(EngineConfig::default()).expect("default engine");
    api::router(AppState::new(EngineHandle::new(engine))).merge(metrics.router())
}

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let app = build_app();

    // One served and one empty query, so both counters exist.
    for items in [json!([{ "title": "A", "url": "/blog/a" }]), json!([])] {
        let payload = json!({ "feed_document": items, "telemetry": false });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/related")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "related_requests_total",
        "related_empty_total",
        "related_candidates",
        "feed_records_total",
        "related_max_items",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
}

#[test]
fn init_twice_reuses_recorder() {
    assert!(Metrics::init(3).is_ok());
    assert!(Metrics::init(5).is_ok());
}
