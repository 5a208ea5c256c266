//! Application handlers.
//!
//! Handlers that orchestrate domain operations over the ports.

pub mod relay;

pub use relay::{
    ConversationAssembler, ErrorPayload, ErrorTranslator, RelayError, RelaySettings,
    RelayTurnCommand, RelayTurnHandler, ResponseChannel, StreamAdapter, StreamHooks,
    StreamOutcome,
};
