//! Session limit middleware for WebSocket connections
//!
//! Reserves a session slot for every WebSocket upgrade and rejects the
//! upgrade with 503 when none is left. The slot travels to the handler in
//! the request extensions and is released when the session ends. Other
//! requests pass through.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use cine_bridge::middleware::session_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/ws", get(bridge_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         session_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::state::AppState;

pub async fn session_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let Some(slot) = state.try_reserve_session() else {
        tracing::warn!(
            sessions = state.registry.active_count(),
            "Rejecting connection: session limit reached"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "Server at capacity. Please try again later.",
        )
            .into_response();
    };

    request.extensions_mut().insert(slot);
    next.run(request).await
}
