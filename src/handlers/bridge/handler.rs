//! Bridge WebSocket handler
//!
//! Each accepted connection becomes one session: the client socket and a
//! fresh OpenAI Realtime connection, routed by a [`SessionCoordinator`]
//! until either side goes away.

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::gateway::ClientGateway;
use crate::core::session::{SessionCoordinator, SessionHandle};
use crate::core::upstream::OpenAIConnector;
use crate::state::{AppState, SessionSlot};

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct BridgeQuery {
    /// Preferred response language, e.g. `ja` or `en`
    pub language: Option<String>,
}

/// Upgrade to WebSocket and run a bridged session on the connection.
///
/// The session slot reserved by the session limit middleware is held until
/// the session ends.
pub async fn bridge_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<BridgeQuery>,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<SessionSlot>>,
) -> Response {
    let language = query
        .language
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| state.config.default_language.clone());

    info!(language = %language, "Bridge WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_bridge_socket(socket, state, language, slot.map(|Extension(s)| s))
        })
}

async fn handle_bridge_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    language: String,
    slot: Option<SessionSlot>,
) {
    let handle = Arc::new(SessionHandle::generate(language));
    info!(
        session_id = %handle.id(),
        sessions = state.registry.active_count() + 1,
        "Client connected"
    );

    let client = ClientGateway::new(socket, state.config.client_queue_capacity);

    let mut upstream_settings = state.config.upstream_settings(handle.language());
    upstream_settings.tools = state.dispatcher.definitions();
    let upstream = OpenAIConnector::new(upstream_settings);

    let coordinator = SessionCoordinator::new(
        handle,
        state.registry.clone(),
        Box::new(client),
        Box::new(upstream),
        state.dispatcher.clone(),
        state.coordinator_settings(),
    );

    let summary = coordinator.run().await;
    drop(slot);
    info!(
        session_id = %summary.session_id,
        cause = %summary.cause,
        sessions = state.registry.active_count(),
        "Client disconnected"
    );
}
