//! Chat turn relay: context assembly, streaming and error translation.

mod assembler;
mod error_translator;
mod errors;
mod relay_turn;
mod response_channel;
mod stream_adapter;

pub use assembler::ConversationAssembler;
pub use error_translator::{ErrorEnvelope, ErrorPayload, ErrorTranslator, INTERNAL_ERROR_MESSAGE};
pub use errors::RelayError;
pub use relay_turn::{
    PreparedTurn, RelaySettings, RelayTurnCommand, RelayTurnHandler, DEFAULT_PERSONA,
    MAX_MESSAGE_CHARS,
};
pub use response_channel::{event_frame, ChannelConfig, ChannelError, FrameStream, ResponseChannel};
pub use stream_adapter::{
    HookError, NoopHooks, StreamAdapter, StreamHooks, StreamOutcome, Transition,
};
