use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::state::AppState;

/// Health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub connected_clients: usize,
    pub tools: usize,
    pub uptime_secs: u64,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

/// Health check handler
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Json(HealthResponse {
        status: "healthy",
        service: "CineBot WebSocket Server",
        connected_clients: state.registry.active_count(),
        tools: state.dispatcher.tool_count(),
        uptime_secs: state.uptime_secs(),
        timestamp,
    })
}
