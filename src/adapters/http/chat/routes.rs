//! Route definitions for chat endpoints

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{health, relay_turn, ChatAppState};

/// Create chat router with all endpoints
///
/// # Endpoints
///
/// - `POST /api/chat` - Relay a turn; the answer streams back as `text/event-stream`
/// - `GET /health` - Liveness probe
pub fn routes() -> Router<ChatAppState> {
    Router::new()
        .route("/api/chat", post(relay_turn))
        .route("/health", get(health))
}
