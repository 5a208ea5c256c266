//! OpenAI Provider - Streaming chat completions from OpenAI or Azure OpenAI.
//!
//! # Configuration
//!
//! ```ignore
//! // Plain OpenAI
//! let config = OpenAIConfig::new(api_key)
//!     .with_model("gpt-4")
//!     .with_base_url("https://api.openai.com/v1");
//!
//! // Azure OpenAI
//! let config = OpenAIConfig::new(api_key)
//!     .with_base_url("https://my-resource.openai.azure.com")
//!     .with_azure_deployment("gpt4-prod", "2024-02-15-preview");
//!
//! let provider = OpenAIProvider::new(config)?;
//! ```
//!
//! # Streaming
//!
//! The request is sent on the first poll of the returned stream. The body is
//! Server-Sent Events; lines are buffered across network chunks and decoded
//! into `StreamChunk`s until the `[DONE]` marker.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::domain::chat::ChatMessage;
use crate::ports::{
    CompletionProvider, CompletionRequest, CompletionStream, FinishReason, ProviderError,
    StreamChunk,
};

/// Which flavour of the chat-completions API to address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiStyle {
    /// `{base_url}/chat/completions` with a bearer token.
    OpenAI,
    /// `{base_url}/openai/deployments/{deployment}/chat/completions` with an `api-key` header.
    Azure {
        deployment: String,
        api_version: String,
    },
}

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model to use (ignored by Azure, which routes by deployment).
    pub model: String,
    /// Base URL for the API (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Addressing and authentication style.
    pub api_style: ApiStyle,
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
}

impl OpenAIConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_style: ApiStyle::OpenAI,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Switches to Azure OpenAI addressing.
    pub fn with_azure_deployment(
        mut self,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        self.api_style = ApiStyle::Azure {
            deployment: deployment.into(),
            api_version: api_version.into(),
        };
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Exposes the API key (for making requests).
    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// OpenAI / Azure OpenAI provider implementation.
pub struct OpenAIProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIProvider {
    /// Creates a new provider with the given configuration.
    ///
    /// No overall request timeout is set: a streamed answer may legitimately
    /// run for minutes. Stalls are caught by the relay's idle timeout.
    pub fn new(config: OpenAIConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Builds the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match &self.config.api_style {
            ApiStyle::OpenAI => format!("{}/chat/completions", base),
            ApiStyle::Azure {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, deployment, api_version
            ),
        }
    }

    /// Builds the request with URL, credentials and body.
    fn build_request(&self, request: &CompletionRequest) -> RequestBuilder {
        let builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .json(&self.to_openai_request(request));

        match self.config.api_style {
            ApiStyle::OpenAI => {
                builder.header("Authorization", format!("Bearer {}", self.config.api_key()))
            }
            ApiStyle::Azure { .. } => builder.header("api-key", self.config.api_key()),
        }
    }

    /// Converts our request to OpenAI's format.
    fn to_openai_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        OpenAIRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            temperature: request.temperature,
            stream: true,
        }
    }

    fn map_send_error(error: reqwest::Error, connect_timeout: Duration) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout {
                timeout_secs: connect_timeout.as_secs(),
            }
        } else if error.is_connect() {
            ProviderError::network(format!("Connection failed: {}", error))
        } else {
            ProviderError::network(error.to_string())
        }
    }

    /// Maps a non-success response to a provider error.
    async fn handle_response_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let retry_header = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let error_body = response.text().await.unwrap_or_default();

        Err(Self::classify_status(status.as_u16(), retry_header, &error_body))
    }

    fn classify_status(status: u16, retry_header: Option<u32>, error_body: &str) -> ProviderError {
        match status {
            401 | 403 => ProviderError::AuthenticationFailed,
            429 => ProviderError::rate_limited(
                retry_header.unwrap_or_else(|| Self::parse_retry_after(error_body)),
            ),
            400 => {
                if error_body.contains("maximum context length")
                    || error_body.contains("context_length_exceeded")
                {
                    ProviderError::ContextTooLong
                } else if error_body.contains("content_filter") {
                    ProviderError::content_filtered("prompt rejected by the provider's content filter")
                } else {
                    ProviderError::InvalidRequest(Self::error_message(error_body))
                }
            }
            _ => ProviderError::unavailable(status, Self::error_message(error_body)),
        }
    }

    /// Pulls `error.message` out of an error body, falling back to the raw text.
    fn error_message(error_body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(error_body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| error_body.to_string())
    }

    /// Parses retry-after from error response.
    fn parse_retry_after(error_body: &str) -> u32 {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(error_body) {
            if let Some(msg) = parsed.get("error").and_then(|e| e.get("message")) {
                if let Some(s) = msg.as_str() {
                    // "... try again in 20 seconds."
                    if let Some(idx) = s.find("try again in ") {
                        let rest = &s[idx + 13..];
                        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                        if let Ok(secs) = digits.parse::<u32>() {
                            return secs;
                        }
                    }
                }
            }
        }
        30
    }
}

impl CompletionProvider for OpenAIProvider {
    fn create_stream(&self, request: CompletionRequest) -> CompletionStream {
        let pending = self.build_request(&request);
        let connect_timeout = self.config.connect_timeout;
        let message_count = request.messages.len();

        let opening = async move {
            debug!(messages = message_count, "Opening completion stream");
            let response = pending
                .send()
                .await
                .map_err(|e| Self::map_send_error(e, connect_timeout))?;
            let response = Self::handle_response_status(response).await?;
            Ok::<_, ProviderError>(decode_event_stream(response.bytes_stream().boxed()))
        };

        stream::once(opening)
            .flat_map(|opened| match opened {
                Ok(chunks) => chunks,
                Err(err) => stream::once(async move { Err(err) }).boxed(),
            })
            .boxed()
    }

    fn name(&self) -> &str {
        match self.config.api_style {
            ApiStyle::OpenAI => "openai",
            ApiStyle::Azure { .. } => "azure",
        }
    }
}

/// Incremental decoder for a chat-completions event stream.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feeds raw bytes; returns every chunk completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, ProviderError>> {
        self.buffer.extend_from_slice(bytes);
        let mut decoded = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(item) = self.decode_line(&String::from_utf8_lossy(&line)) {
                decoded.push(item);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }

        decoded
    }

    /// Decodes whatever is left once the body ends.
    fn finish(&mut self) -> Vec<Result<StreamChunk, ProviderError>> {
        let rest = std::mem::take(&mut self.buffer);
        if self.done || rest.is_empty() {
            return Vec::new();
        }
        self.decode_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<Result<StreamChunk, ProviderError>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let data = line.strip_prefix("data:")?.trim_start();

        if data == "[DONE]" {
            self.done = true;
            return None;
        }
        if data.is_empty() {
            return None;
        }

        match serde_json::from_str::<StreamResponseChunk>(data) {
            Ok(chunk) => {
                if let Some(error) = chunk.error {
                    return Some(Err(ProviderError::unavailable(502, error.message)));
                }
                // Azure opens with a choices-less prompt filter report.
                let choice = chunk.choices.into_iter().next()?;
                let delta = choice.delta.content.unwrap_or_default();
                match choice.finish_reason {
                    Some(reason) => Some(Ok(StreamChunk::final_chunk(
                        delta,
                        FinishReason::from_wire(&reason),
                    ))),
                    None if delta.is_empty() => None,
                    None => Some(Ok(StreamChunk::content(delta))),
                }
            }
            Err(e) => Some(Err(ProviderError::parse(format!(
                "Failed to parse SSE chunk: {}",
                e
            )))),
        }
    }
}

struct DecodeState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamChunk, ProviderError>>,
    finished: bool,
}

/// Turns a response body into completion chunks. Ends at `[DONE]`, at body
/// end, or after the first transport error.
fn decode_event_stream(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> CompletionStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let decoded = state.decoder.feed(&bytes);
                    state.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(ProviderError::network(format!("Stream error: {}", e))));
                }
                None => {
                    state.finished = true;
                    let decoded = state.decoder.finish();
                    state.pending.extend(decoded);
                }
            }
            if state.decoder.done {
                state.finished = true;
            }
        }
    })
    .boxed()
}

// ----- OpenAI API Types -----

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
