//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, the state machine trait and the
//! validation error type used across the chat relay.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use ids::{ChatId, MessageId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
