use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const CACHE_HITS: &str = "danmaku_cache_hits_total";
pub const CACHE_MISSES: &str = "danmaku_cache_misses_total";
pub const PIPELINE_RUNS: &str = "danmaku_pipeline_runs_total";
pub const FETCH_ERRORS: &str = "danmaku_fetch_errors_total";
pub const PIPELINE_DURATION_MS: &str = "danmaku_pipeline_duration_ms";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init(cache_max_size: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!(CACHE_HITS, "Cache lookups that returned a live entry");
        describe_counter!(CACHE_MISSES, "Cache lookups that found nothing live");
        describe_counter!(PIPELINE_RUNS, "Analysis pipeline runs");
        describe_counter!(FETCH_ERRORS, "Comment fetches that failed upstream");
        describe_histogram!(PIPELINE_DURATION_MS, "Analysis pipeline wall time in ms");

        gauge!("danmaku_cache_max_size").set(cache_max_size as f64);

        Ok(Self { handle })
    }

    /// Recorder that is not installed globally; `/metrics` renders an empty page.
    /// Used where several routers live in one process (tests).
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
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
