//! Bridge WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::bridge::bridge_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the bridge WebSocket router
///
/// # Endpoint
///
/// `GET /ws?language=ja` - WebSocket upgrade for a bridged session
///
/// # Protocol
///
/// Server sends `connection_established` once the upstream session is ready.
/// Clients then send:
/// - plain text or `{"type": "text", "text": "..."}` messages
/// - binary PCM16 audio frames or `input_audio_buffer.append`
/// - `input_audio_buffer.commit` / `response.create` / `response.cancel`
///
/// Server responds with `text_response`, `response.audio.delta`,
/// `transcript`, `response.done`, `tool_output` and `error` messages, each
/// carrying the per-session `sequence` number.
pub fn create_bridge_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(bridge_handler))
        .layer(TraceLayer::new_for_http())
}
