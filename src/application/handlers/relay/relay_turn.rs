//! RelayTurnHandler - Orchestrates one chat turn end to end.
//!
//! Pre-stream (`prepare`): validate, check provider configuration, load the
//! window, merge the incoming turn (system message write-back), persist the
//! user message. Any failure here is returned before a stream exists.
//!
//! Streaming (`stream`): open the provider stream and hand it to the
//! [`StreamAdapter`] with hooks that persist the assistant reply on completion.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::domain::chat::{ChatMessage, Role};
use crate::domain::foundation::{ChatId, MessageId, ValidationError};
use crate::ports::{CompletionProvider, CompletionRequest, MessageRepository};

use super::assembler::ConversationAssembler;
use super::error_translator::ErrorTranslator;
use super::errors::RelayError;
use super::response_channel::{ChannelConfig, ResponseChannel};
use super::stream_adapter::{HookError, StreamAdapter, StreamHooks, StreamOutcome};

/// Longest accepted message content, in characters.
pub const MAX_MESSAGE_CHARS: usize = 32_000;

/// Persona used when neither storage nor the request supplies a system message.
pub const DEFAULT_PERSONA: &str =
    "You are a helpful AI assistant. Provide clear, accurate, and relevant responses.";

/// Explicit settings for the relay; derived from configuration at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub max_conversation_pairs: usize,
    pub temperature: f32,
    pub model: String,
    pub default_persona: String,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub channel_buffer: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_conversation_pairs: 50,
            temperature: 0.7,
            model: "gpt-4".to_string(),
            default_persona: DEFAULT_PERSONA.to_string(),
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(30),
            channel_buffer: 32,
        }
    }
}

impl RelaySettings {
    /// Sizing for the response channel of each turn.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            buffer: self.channel_buffer,
            write_timeout: self.write_timeout,
        }
    }
}

/// A validated turn request.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayTurnCommand {
    chat_id: ChatId,
    messages: Vec<ChatMessage>,
}

impl RelayTurnCommand {
    /// Validates the incoming messages.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if there are no messages, or the latest user message is blank
    /// - `TooLong` if any message exceeds [`MAX_MESSAGE_CHARS`]
    /// - `InvalidFormat` for more than one system message, or when the last
    ///   non-system message is not from the user
    pub fn new(chat_id: ChatId, messages: Vec<ChatMessage>) -> Result<Self, ValidationError> {
        if messages.is_empty() {
            return Err(ValidationError::empty_field("messages"));
        }

        for (index, message) in messages.iter().enumerate() {
            let chars = message.content.chars().count();
            if chars > MAX_MESSAGE_CHARS {
                return Err(ValidationError::too_long(
                    format!("messages[{}].content", index),
                    MAX_MESSAGE_CHARS,
                    chars,
                ));
            }
        }

        if messages.iter().filter(|m| m.role.is_system()).count() > 1 {
            return Err(ValidationError::invalid_format(
                "messages",
                "at most one system message is allowed",
            ));
        }

        match messages.iter().rev().find(|m| !m.role.is_system()) {
            Some(last) if last.role == Role::User => {
                if last.content.trim().is_empty() {
                    return Err(ValidationError::empty_field("messages.user.content"));
                }
            }
            _ => {
                return Err(ValidationError::invalid_format(
                    "messages",
                    "the last message must be from the user",
                ))
            }
        }

        Ok(Self { chat_id, messages })
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The user message this turn answers.
    fn latest_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}

/// A turn that passed every pre-stream step and is ready to stream.
pub struct PreparedTurn {
    chat_id: ChatId,
    user_message_id: MessageId,
    provider: Arc<dyn CompletionProvider>,
    request: CompletionRequest,
}

impl PreparedTurn {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn user_message_id(&self) -> MessageId {
        self.user_message_id
    }

    /// The exact context that will be sent to the provider.
    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }
}

/// Handler for relaying chat turns.
pub struct RelayTurnHandler {
    provider: Option<Arc<dyn CompletionProvider>>,
    repository: Arc<dyn MessageRepository>,
    assembler: ConversationAssembler,
    adapter: StreamAdapter,
    translator: Arc<ErrorTranslator>,
    settings: RelaySettings,
}

impl RelayTurnHandler {
    /// Creates the handler. A `None` provider means credentials are missing;
    /// every turn then fails with a configuration error.
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        repository: Arc<dyn MessageRepository>,
        translator: ErrorTranslator,
        settings: RelaySettings,
    ) -> Self {
        let translator = Arc::new(translator);
        Self {
            provider,
            assembler: ConversationAssembler::new(
                repository.clone(),
                settings.default_persona.clone(),
            ),
            repository,
            adapter: StreamAdapter::new(settings.idle_timeout, translator.clone()),
            translator,
            settings,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn translator(&self) -> &ErrorTranslator {
        &self.translator
    }

    /// Runs every pre-stream step.
    pub async fn prepare(&self, cmd: RelayTurnCommand) -> Result<PreparedTurn, RelayError> {
        let provider = self.provider.clone().ok_or_else(|| {
            RelayError::configuration("completion provider credentials are missing")
        })?;
        let user = cmd
            .latest_user_message()
            .ok_or_else(|| ValidationError::empty_field("messages.user"))?;

        // Fetched before the user message is stored so the window never holds
        // messages from the current turn.
        let window = self
            .assembler
            .fetch_window(&cmd.chat_id, self.settings.max_conversation_pairs)
            .await?;
        let messages = self
            .assembler
            .merge_with_incoming(&cmd.chat_id, &window, &cmd.messages)
            .await?;

        let stored = self
            .repository
            .create_message(&cmd.chat_id, Role::User, &user.content)
            .await?;

        debug!(
            chat_id = %cmd.chat_id,
            provider = provider.name(),
            history = window.len(),
            messages = messages.len(),
            context = ?messages
                .iter()
                .map(|m| (m.role.as_str(), m.content.len()))
                .collect::<Vec<_>>(),
            "Assembled provider context"
        );

        Ok(PreparedTurn {
            chat_id: cmd.chat_id,
            user_message_id: stored.id,
            provider,
            request: CompletionRequest::new(
                self.settings.model.clone(),
                messages,
                self.settings.temperature,
            ),
        })
    }

    /// Streams a prepared turn into the channel. Always closes the channel.
    pub async fn stream(&self, turn: PreparedTurn, channel: &mut ResponseChannel) -> StreamOutcome {
        let hooks = PersistReplyHooks {
            repository: self.repository.clone(),
            chat_id: turn.chat_id,
        };
        let stream = turn.provider.create_stream(turn.request);

        let outcome = self.adapter.start(turn.chat_id, stream, &hooks, channel).await;
        info!(
            chat_id = %turn.chat_id,
            tokens = outcome.tokens(),
            completed = matches!(outcome, StreamOutcome::Completed { .. }),
            "Turn finished"
        );
        outcome
    }

    /// Prepares and streams a turn in one call.
    pub async fn handle(
        &self,
        cmd: RelayTurnCommand,
        channel: &mut ResponseChannel,
    ) -> Result<StreamOutcome, RelayError> {
        let turn = self.prepare(cmd).await?;
        Ok(self.stream(turn, channel).await)
    }
}

/// Stores the assistant reply once the stream completes.
struct PersistReplyHooks {
    repository: Arc<dyn MessageRepository>,
    chat_id: ChatId,
}

#[async_trait]
impl StreamHooks for PersistReplyHooks {
    async fn on_token(&self, token: &str) -> Result<(), HookError> {
        trace!(chat_id = %self.chat_id, len = token.len(), "Token forwarded");
        Ok(())
    }

    async fn on_completion(&self, completion: &str) -> Result<(), HookError> {
        let stored = self
            .repository
            .create_message(&self.chat_id, Role::Assistant, completion)
            .await?;
        debug!(chat_id = %self.chat_id, message_id = %stored.id, "Assistant reply stored");
        Ok(())
    }
}
