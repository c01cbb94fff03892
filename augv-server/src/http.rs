// HTTP server with status queries, raw frame upload and WebSocket routes

use crate::ingest::Ingestor;
use crate::metrics::Metrics;
use crate::websocket::{agent_ws_handler, monitor_ws_handler};
use augv_core::{AgentId, AgentView, AugvConfig};
use augv_eye::annotate::snapshot_path;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

/// Shared state of every route
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub config: Arc<AugvConfig>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Agents with an open stream
    pub agents: Vec<AgentId>,
    pub monitors: usize,
    pub workers: usize,
    /// Unix seconds
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentId>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/augv/:agent_id", get(agent_ws_handler))
        .route("/ws/monitor", get(monitor_ws_handler))
        .route("/api/yolo/stream/:agent_id", post(stream_frame_handler))
        .route("/api/yolo/check_all", get(check_all_handler))
        .route("/api/yolo/status/:agent_id", get(agent_status_handler))
        .route("/api/yolo/image/:agent_id", get(agent_image_handler))
        .route("/api/agents", get(active_agents_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bad_request(error: impl Into<String>, code: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error, code))).into_response()
}

fn dimension(headers: &HeaderMap, name: &str, default: u32) -> Result<u32, String> {
    match headers.get(name) {
        None => Ok(default),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| format!("Invalid {} header", name)),
    }
}

/// Raw BGR frame upload, sized by the `Width` / `Height` headers
async fn stream_frame_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let agent_id = match AgentId::new(agent_id) {
        Ok(id) => id,
        Err(e) => return bad_request(e.to_string(), "invalid_agent_id"),
    };

    let worker = &state.config.worker;
    let size = dimension(&headers, "Width", worker.raw_default_width)
        .and_then(|w| dimension(&headers, "Height", worker.raw_default_height).map(|h| (w, h)));
    let (width, height) = match size {
        Ok(size) => size,
        Err(e) => return bad_request(e, "invalid_dimensions"),
    };

    match state.ingestor.ingest_raw(&agent_id, &body, width, height) {
        Ok(offer) => {
            debug!("[AUGV {}] HTTP frame {}x{}: {:?}", agent_id, width, height, offer);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            warn!("[AUGV {}] frame decode error: {}", agent_id, e);
            bad_request(e.to_string(), "decode_error")
        }
    }
}

/// Status of every known agent, keyed by agent id
async fn check_all_handler(State(state): State<AppState>) -> Json<BTreeMap<AgentId, AgentView>> {
    let views = state.ingestor.registry().views();
    Json(views.into_iter().map(|v| (v.agent_id.clone(), v)).collect())
}

async fn agent_status_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Response {
    let agent_id = match AgentId::new(agent_id) {
        Ok(id) => id,
        Err(e) => return bad_request(e.to_string(), "invalid_agent_id"),
    };
    match state.ingestor.registry().view(&agent_id) {
        Some(view) => Json(view).into_response(),
        None => (StatusCode::NOT_FOUND, Json(AgentView::unknown(agent_id))).into_response(),
    }
}

/// Latest debug snapshot of an agent
async fn agent_image_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Response {
    let agent_id = match AgentId::new(agent_id) {
        Ok(id) => id,
        Err(e) => return bad_request(e.to_string(), "invalid_agent_id"),
    };
    let path = snapshot_path(&state.config.worker.debug_dir, &agent_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                format!("No snapshot for {}", agent_id),
                "not_found",
            )),
        )
            .into_response(),
    }
}

/// Agents seen within the liveness window
async fn active_agents_handler(State(state): State<AppState>) -> Json<AgentsResponse> {
    let window = state.config.registry.liveness_window();
    Json(AgentsResponse {
        agents: state.ingestor.registry().active_agents(window),
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agents: state.ingestor.registry().connected_streams(),
        monitors: state.ingestor.hub().len(),
        workers: state.ingestor.pool().running().len(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Prometheus text format
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}
