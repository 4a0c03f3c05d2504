use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::rank::DEFAULT_MAX_ITEMS;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and describe the
    /// engine series. Later calls reuse the installed handle.
    pub fn init(max_items: usize) -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .map_err(|e| anyhow!("prometheus: install recorder: {e}"))
            })?
            .clone();

        describe_counter!("related_requests_total", "Related-items queries served.");
        describe_counter!("related_empty_total", "Related-items queries with no results.");
        describe_histogram!("related_candidates", "Candidates scored per query.");
        describe_counter!("telemetry_errors_total", "Telemetry sends that failed.");
        crate::ingest::ensure_metrics_described();

        gauge!("related_max_items").set(max_items as f64);

        Ok(Self { handle })
    }

    pub fn init_default() -> Result<Self> {
        Self::init(DEFAULT_MAX_ITEMS)
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
