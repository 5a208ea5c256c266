//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! - `CompletionProvider` - Streaming LLM completion source
//! - `MessageRepository` - Chat message persistence

mod completion_provider;
mod message_repository;

pub use completion_provider::{
    CompletionProvider, CompletionRequest, CompletionStream, FinishReason, ProviderError,
    StreamChunk,
};
pub use message_repository::{MessageRepository, RepositoryError};
