//! Danmaku analyzer: binary entrypoint.
//! Boots the Axum HTTP server with config, cache, fetcher and text-generation client wired in.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use danmaku_analyzer::ai::build_client_from_config;
use danmaku_analyzer::config::AppConfig;
use danmaku_analyzer::fetcher::BilibiliClient;
use danmaku_analyzer::metrics::Metrics;
use danmaku_analyzer::{router, AppState, Pipeline};

/// Enable tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - DANMAKU_DEV_LOG=1
/// `LOG_FORMAT=json` switches the compact layer for JSON lines.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("DANMAKU_DEV_LOG")
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
        .unwrap_or_else(|_| EnvFilter::new("pipeline=info,fetcher=info,cache=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let config = AppConfig::load_default().context("loading danmaku config")?;
    let metrics = Metrics::init(config.cache.max_size)?;

    let source = BilibiliClient::new(&config.network).context("building bilibili client")?;
    let ai = build_client_from_config(&config.ai).context("building ai client")?;
    info!(
        target: "pipeline",
        ai_provider = ai.provider_name(),
        cache_max_size = config.cache.max_size,
        "starting danmaku analyzer"
    );

    let pipeline = Arc::new(Pipeline::new(config, Arc::new(source), ai));
    let app = router(AppState::new(pipeline), &metrics);

    Ok(app.into())
}
