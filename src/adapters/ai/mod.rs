//! Completion Provider Adapters.
//!
//! Implementations of the CompletionProvider port.
//!
//! ## Available Adapters
//!
//! - `OpenAIProvider` - OpenAI and Azure OpenAI chat completions (streaming)
//! - `MockCompletionProvider` - Scripted provider for testing

mod mock_provider;
mod openai_provider;

pub use mock_provider::MockCompletionProvider;
pub use openai_provider::{ApiStyle, OpenAIConfig, OpenAIProvider};
