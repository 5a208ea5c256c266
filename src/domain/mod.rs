//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `chat` - Messages, conversation windows and the per-turn stream session

pub mod chat;
pub mod foundation;
