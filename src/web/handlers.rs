//! HTTP request handlers.

use super::AppState;
use crate::probe::{NameResolver, Prober};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ============================================================================
// Info
// ============================================================================

pub async fn handle_root() -> impl IntoResponse {
    Json(json!({ "version": "2.0", "model": "EWMA-Anomaly-Detector" }))
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub message: String,
    pub targets: Vec<String>,
}

pub async fn handle_start<P: Prober, R: NameResolver>(
    State(state): State<AppState<P, R>>,
    Json(req): Json<StartRequest>,
) -> impl IntoResponse {
    match state.monitor.start(&req.url).await {
        Ok(targets) => Json(StartResponse {
            message: "Monitoring Started with AI Detector".to_string(),
            targets,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!("Start rejected: {}", e);
            (StatusCode::BAD_REQUEST, Json(json!({ "detail": e.to_string() }))).into_response()
        }
    }
}

pub async fn handle_stop<P: Prober, R: NameResolver>(
    State(state): State<AppState<P, R>>,
) -> impl IntoResponse {
    state.monitor.stop();
    Json(json!({ "message": "Stopped" }))
}

// ============================================================================
// Status
// ============================================================================

pub async fn handle_status<P: Prober, R: NameResolver>(
    State(state): State<AppState<P, R>>,
) -> impl IntoResponse {
    Json(state.monitor.status())
}
