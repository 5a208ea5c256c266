//! HTTP adapters - REST API implementations.
//!
//! - `chat` - Turn relay endpoint and health probe

pub mod chat;

use axum::Router;

pub use chat::ChatAppState;

/// Builds the application router with its state applied.
pub fn chat_router(state: ChatAppState) -> Router {
    chat::routes().with_state(state)
}
