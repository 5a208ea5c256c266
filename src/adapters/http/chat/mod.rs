//! Chat HTTP adapter
//!
//! Exposes the relay over HTTP with server-sent event responses.

mod dto;
mod handlers;
mod routes;

pub use dto::{HealthResponse, TurnMessage, TurnRequest};
pub use handlers::{health, relay_turn, ChatAppState};
pub use routes::routes;
