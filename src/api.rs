use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::cache::CacheStats;
use crate::error::AnalyzerError;
use crate::fetcher::{InterfaceKind, VideoInfo};
use crate::metrics::Metrics;
use crate::pipeline::{AnalyzeRequest, Pipeline};
use crate::record::CommentRecord;
use crate::summary::Summary;
use crate::validator::{
    sanitize_error_message, validate_analysis_parameters, validate_date_input,
    validate_number_input, validate_page_number, validate_video_id, validate_video_input,
};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

/// Build the full HTTP surface, `/metrics` included.
pub fn router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/analyze", post(analyze))
        .route("/report", post(report))
        .route("/video-info", get(video_info))
        .route("/comments", get(comments))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", post(cache_clear))
        .route("/cache/video/{id}", delete(cache_invalidate))
        .with_state(state)
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
}

// ------------------------------------------------------------
// Errors
// ------------------------------------------------------------

pub struct ApiError(AnalyzerError);

impl From<AnalyzerError> for ApiError {
    fn from(e: AnalyzerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            AnalyzerError::Network { .. } | AnalyzerError::Upstream(_) | AnalyzerError::Decode(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status != StatusCode::BAD_REQUEST {
            warn!(target: "api", kind = self.0.kind(), error = %self.0, "request failed");
        }
        let body = json!({
            "error": sanitize_error_message(&self.0.to_string()),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

#[derive(Deserialize)]
struct AnalyzeBody {
    video: String,
    #[serde(default)]
    page: Option<Value>,
    #[serde(default)]
    interface: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time_interval: Option<Value>,
    #[serde(default)]
    keyword_count: Option<Value>,
    #[serde(default)]
    ai: bool,
}

async fn analyze(State(state): State<AppState>, Json(body): Json<AnalyzeBody>) -> ApiResult<Response> {
    let cfg = state.pipeline.config();
    let video = validate_video_input(&body.video)?;
    let page = match &body.page {
        Some(v) => validate_page_number(v, cfg.ui.max_page)?,
        None => 1,
    };
    let interface = match body.interface.as_deref() {
        Some(raw) => raw.parse::<InterfaceKind>()?,
        None => InterfaceKind::default(),
    };
    let date = validate_date_input(body.date.as_deref())?;
    let (time_interval, keyword_count) = validate_analysis_parameters(
        body.time_interval
            .as_ref()
            .unwrap_or(&json!(cfg.ui.time_interval_default)),
        body.keyword_count
            .as_ref()
            .unwrap_or(&json!(cfg.ui.keyword_count_default)),
        &cfg.ui,
    )?;

    let req = AnalyzeRequest {
        video_id: video.video_id(),
        page,
        interface,
        date,
        time_interval,
        keyword_count,
        with_ai: body.ai,
    };
    let out = state.pipeline.analyze(&req).await?;

    if let Summary::Empty { error } = &out.summary {
        return Ok((StatusCode::NOT_FOUND, Json(json!({ "error": error }))).into_response());
    }
    let resp = json!({
        "video": out.video_id,
        "page": out.page,
        "report": out.summary,
        "charts": out.charts,
        "ai": out.ai,
        "cached": out.cached,
    });
    Ok(Json(resp).into_response())
}

#[derive(Deserialize)]
struct ReportBody {
    records: Vec<CommentRecord>,
    #[serde(default)]
    time_interval: Option<Value>,
}

async fn report(State(state): State<AppState>, Json(body): Json<ReportBody>) -> ApiResult<Json<Summary>> {
    let cfg = state.pipeline.config();
    let interval = match &body.time_interval {
        Some(v) => validate_number_input(
            v,
            Some(cfg.ui.time_interval_min as f64),
            Some(cfg.ui.time_interval_max as f64),
            "time_interval",
        )?,
        None => cfg.ui.time_interval_default as f64,
    };
    let max = cfg.analysis.max_danmaku_count;
    if body.records.len() > max {
        return Err(AnalyzerError::OutOfRange {
            field: "records".to_string(),
            value: body.records.len() as f64,
            min: 0.0,
            max: max as f64,
        }
        .into());
    }
    Ok(Json(state.pipeline.summarize(&body.records, interval)?))
}

#[derive(Deserialize)]
struct VideoQuery {
    video: String,
}

async fn video_info(
    State(state): State<AppState>,
    Query(q): Query<VideoQuery>,
) -> ApiResult<Json<VideoInfo>> {
    let video = validate_video_input(&q.video)?;
    let info = state.pipeline.video_info(&video.video_id()).await?;
    Ok(Json(info.as_ref().clone()))
}

#[derive(Deserialize)]
struct CommentsQuery {
    video: String,
    page: Option<String>,
    interface: Option<String>,
    date: Option<String>,
}

/// Full comment list of one part, as cached for analysis (download/export).
async fn comments(
    State(state): State<AppState>,
    Query(q): Query<CommentsQuery>,
) -> ApiResult<Json<Value>> {
    let cfg = state.pipeline.config();
    let video = validate_video_input(&q.video)?;
    let page = match q.page {
        Some(raw) => validate_page_number(&Value::String(raw), cfg.ui.max_page)?,
        None => 1,
    };
    let interface = match q.interface.as_deref() {
        Some(raw) => raw.parse::<InterfaceKind>()?,
        None => InterfaceKind::default(),
    };
    let date = validate_date_input(q.date.as_deref())?;
    let video_id = video.video_id();
    let records = state
        .pipeline
        .comments(&video_id, page, interface, date)
        .await?;
    Ok(Json(json!({
        "video": video_id,
        "page": page,
        "interface": interface,
        "count": records.len(),
        "records": records.as_ref(),
    })))
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.pipeline.cache_stats())
}

async fn cache_clear(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.pipeline.clear_cache())
}

async fn cache_invalidate(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let id = validate_video_id(&id)?;
    let removed = state.pipeline.invalidate_video(&id);
    Ok(Json(json!({ "removed": removed })))
}
