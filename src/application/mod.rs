//! Application layer - Turn orchestration.
//!
//! This layer coordinates the domain and the ports. It never talks to a
//! concrete provider, store or transport directly.

pub mod handlers;

pub use handlers::{
    ConversationAssembler, ErrorPayload, ErrorTranslator, RelayError, RelaySettings,
    RelayTurnCommand, RelayTurnHandler, ResponseChannel, StreamAdapter, StreamHooks,
    StreamOutcome,
};
