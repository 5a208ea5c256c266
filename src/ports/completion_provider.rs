//! Completion Provider Port - Interface for streaming LLM providers.
//!
//! A provider turns a list of chat messages into a lazy token sequence.
//!
//! # Design
//!
//! - `create_stream` does no I/O: the upstream request is issued on the first
//!   poll, so opening failures arrive as the first item of the stream
//! - the stream is single-pass and not restartable; dropping it releases the
//!   upstream connection
//! - errors carry the provider's status code and kind so they can be
//!   surfaced to the client unchanged
//!
//! # Example
//!
//! ```ignore
//! let mut stream = provider.create_stream(CompletionRequest::new("gpt-4", messages, 0.7));
//! while let Some(chunk) = stream.next().await {
//!     let chunk = chunk?;
//!     print!("{}", chunk.delta);
//!     if chunk.is_final() { break; }
//! }
//! ```

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::domain::chat::ChatMessage;

/// Lazy, single-pass sequence of completion chunks.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Port for streaming completion providers.
///
/// Implementations connect to external AI services (OpenAI, Azure OpenAI)
/// and translate between the provider wire format and our domain types.
pub trait CompletionProvider: Send + Sync {
    /// Creates a completion stream for the given request.
    fn create_stream(&self, request: CompletionRequest) -> CompletionStream;

    /// Provider name for logging (e.g. "openai", "azure").
    fn name(&self) -> &str;
}

/// Request for a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model or deployment identifier.
    pub model: String,
    /// Full ordered context, system message first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a new completion request.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature,
        }
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit the token limit.
    Length,
    /// Content was filtered for safety.
    ContentFilter,
}

impl FinishReason {
    /// Maps the provider's finish_reason string; unknown values count as a stop.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

/// One item of a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// New text in this chunk (may be empty).
    pub delta: String,
    /// If present, generation is complete.
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    /// Creates a content chunk.
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: None,
        }
    }

    /// Creates a final chunk, optionally carrying trailing text.
    pub fn final_chunk(delta: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            delta: delta.into(),
            finish_reason: Some(finish_reason),
        }
    }

    /// Returns true if this is the final chunk.
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Completion provider errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until retry is allowed.
        retry_after_secs: u32,
    },

    /// Context (prompt + history) exceeds model limit.
    #[error("context too long for model")]
    ContextTooLong,

    /// Content was filtered for safety.
    #[error("content filtered: {reason}")]
    ContentFiltered {
        /// Reason for filtering.
        reason: String,
    },

    /// Provider returned a server error.
    #[error("provider unavailable ({status}): {message}")]
    Unavailable {
        /// Upstream HTTP status.
        status: u16,
        /// Error details.
        message: String,
    },

    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Network error during request or while reading the stream.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Provider rejected the request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No progress from the provider within the allowed time.
    #[error("provider timed out after {timeout_secs}s")]
    Timeout {
        /// Configured bound.
        timeout_secs: u64,
    },
}

impl ProviderError {
    /// Creates a rate limited error.
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates a content filtered error.
    pub fn content_filtered(reason: impl Into<String>) -> Self {
        Self::ContentFiltered {
            reason: reason.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(status: u16, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::RateLimited { .. } => 429,
            ProviderError::ContextTooLong
            | ProviderError::ContentFiltered { .. }
            | ProviderError::InvalidRequest(_) => 400,
            ProviderError::Unavailable { status, .. } => *status,
            ProviderError::AuthenticationFailed => 401,
            ProviderError::Network(_) | ProviderError::Parse(_) => 502,
            ProviderError::Timeout { .. } => 504,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::ContextTooLong => "context_too_long",
            ProviderError::ContentFiltered { .. } => "content_filtered",
            ProviderError::Unavailable { .. } => "provider_unavailable",
            ProviderError::AuthenticationFailed => "authentication_failed",
            ProviderError::Network(_) => "network_error",
            ProviderError::Parse(_) => "parse_error",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::Timeout { .. } => "provider_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_keeps_message_order() {
        let request = CompletionRequest::new(
            "gpt-4",
            vec![ChatMessage::system("persona"), ChatMessage::user("Hi")],
            0.7,
        );

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages[0], ChatMessage::system("persona"));
        assert_eq!(request.messages[1], ChatMessage::user("Hi"));
        assert_eq!(request.temperature, 0.7);
    }

    #[test]
    fn stream_chunk_content_is_not_final() {
        let chunk = StreamChunk::content("Hello");
        assert!(!chunk.is_final());
        assert_eq!(chunk.delta, "Hello");
    }

    #[test]
    fn stream_chunk_final_may_carry_text() {
        let chunk = StreamChunk::final_chunk("!", FinishReason::Stop);
        assert!(chunk.is_final());
        assert_eq!(chunk.delta, "!");
    }

    #[test]
    fn finish_reason_maps_wire_values() {
        assert_eq!(FinishReason::from_wire("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_wire("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(FinishReason::from_wire("tool_calls"), FinishReason::Stop);
    }

    #[test]
    fn provider_errors_carry_status_and_kind() {
        assert_eq!(ProviderError::rate_limited(30).status_code(), 429);
        assert_eq!(ProviderError::rate_limited(30).kind(), "rate_limited");
        assert_eq!(ProviderError::AuthenticationFailed.status_code(), 401);
        assert_eq!(ProviderError::unavailable(503, "down").status_code(), 503);
        assert_eq!(ProviderError::network("reset").status_code(), 502);
        assert_eq!(ProviderError::Timeout { timeout_secs: 5 }.status_code(), 504);
        assert_eq!(
            ProviderError::Timeout { timeout_secs: 5 }.kind(),
            "provider_timeout"
        );
    }

    #[test]
    fn provider_error_displays_correctly() {
        assert_eq!(
            ProviderError::rate_limited(30).to_string(),
            "rate limited: retry after 30s"
        );
        assert_eq!(
            ProviderError::unavailable(502, "bad gateway").to_string(),
            "provider unavailable (502): bad gateway"
        );
    }

    #[test]
    fn completion_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn CompletionProvider) {}
    }
}
