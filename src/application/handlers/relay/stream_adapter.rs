//! Stream adapter: drives one provider stream into one response channel.
//!
//! Each step pulls at most one chunk and ends in exactly one transition:
//! a token was forwarded, or the turn reached a terminal state.
//!
//! - **Completed**: provider finished; `on_completion` runs with the full text,
//!   then the channel closes.
//! - **Failed**: provider error, idle timeout, channel fault or hook failure;
//!   one error frame is written, then the channel closes. Tokens already
//!   delivered stay delivered.
//! - **Cancelled**: client went away (or stopped reading); the provider stream
//!   is dropped without another pull and nothing is persisted.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::chat::StreamSession;
use crate::domain::foundation::ChatId;
use crate::ports::{CompletionStream, ProviderError, RepositoryError};

use super::error_translator::{ErrorPayload, ErrorTranslator};
use super::errors::RelayError;
use super::response_channel::ResponseChannel;

/// Failure raised by a lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<RepositoryError> for HookError {
    fn from(err: RepositoryError) -> Self {
        Self(err.to_string())
    }
}

/// Lifecycle callbacks around a stream. All default to no-ops.
///
/// `on_completion` runs only on the completed path, exactly once.
#[async_trait]
pub trait StreamHooks: Send + Sync {
    async fn on_start(&self) -> Result<(), HookError> {
        Ok(())
    }

    async fn on_token(&self, _token: &str) -> Result<(), HookError> {
        Ok(())
    }

    async fn on_completion(&self, _completion: &str) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl StreamHooks for NoopHooks {}

/// Result of one adapter step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    TokenForwarded(String),
    Completed,
    Failed(ErrorPayload),
    Cancelled,
}

impl Transition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Transition::TokenForwarded(_))
    }
}

/// How a streamed turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { text: String, tokens: usize },
    Failed { error: ErrorPayload, tokens: usize },
    Cancelled { tokens: usize },
}

impl StreamOutcome {
    /// Tokens delivered to the client before the turn ended.
    pub fn tokens(&self) -> usize {
        match self {
            StreamOutcome::Completed { tokens, .. }
            | StreamOutcome::Failed { tokens, .. }
            | StreamOutcome::Cancelled { tokens } => *tokens,
        }
    }
}

/// Pumps provider chunks into a [`ResponseChannel`].
#[derive(Debug, Clone)]
pub struct StreamAdapter {
    idle_timeout: Duration,
    translator: Arc<ErrorTranslator>,
}

impl StreamAdapter {
    pub fn new(idle_timeout: Duration, translator: Arc<ErrorTranslator>) -> Self {
        Self {
            idle_timeout,
            translator,
        }
    }

    /// Runs a stream to its terminal state.
    ///
    /// The channel is always closed when this returns.
    pub async fn start(
        &self,
        chat_id: ChatId,
        stream: CompletionStream,
        hooks: &dyn StreamHooks,
        channel: &mut ResponseChannel,
    ) -> StreamOutcome {
        let mut session = StreamSession::new(chat_id);
        if let Err(err) = session.begin() {
            let payload = self.translator.translate(&RelayError::State(err.to_string()));
            if let Err(write_err) = channel.write_error(&payload.to_json()).await {
                warn!(chat_id = %chat_id, error = %write_err, "Could not deliver error frame");
            }
            channel.close();
            return StreamOutcome::Failed {
                error: payload,
                tokens: 0,
            };
        }
        debug!(chat_id = %chat_id, "Stream started");

        let mut stream = until_final(stream);

        let transition = match hooks.on_start().await {
            Ok(()) => loop {
                let transition = self.step(&mut session, &mut stream, hooks, channel).await;
                if transition.is_terminal() {
                    break transition;
                }
            },
            Err(err) => self.fail(&mut session, channel, RelayError::Hook(err)).await,
        };
        drop(stream);

        let tokens = session.tokens_forwarded();
        match transition {
            Transition::Completed => StreamOutcome::Completed {
                text: session.text().to_string(),
                tokens,
            },
            Transition::Failed(error) => StreamOutcome::Failed { error, tokens },
            Transition::Cancelled | Transition::TokenForwarded(_) => {
                StreamOutcome::Cancelled { tokens }
            }
        }
    }

    /// Pulls until one token is forwarded or a terminal state is reached.
    pub async fn step(
        &self,
        session: &mut StreamSession,
        stream: &mut CompletionStream,
        hooks: &dyn StreamHooks,
        channel: &mut ResponseChannel,
    ) -> Transition {
        loop {
            let pulled = tokio::select! {
                biased;
                _ = channel.disconnected() => return self.cancel(session, channel),
                pulled = tokio::time::timeout(self.idle_timeout, stream.next()) => pulled,
            };

            let chunk = match pulled {
                Err(_) => {
                    let timeout = ProviderError::Timeout {
                        timeout_secs: self.idle_timeout.as_secs(),
                    };
                    return self.fail(session, channel, timeout.into()).await;
                }
                Ok(None) => return self.complete(session, hooks, channel).await,
                Ok(Some(Err(err))) => return self.fail(session, channel, err.into()).await,
                Ok(Some(Ok(chunk))) => chunk,
            };

            if chunk.delta.is_empty() {
                continue;
            }

            if let Err(err) = channel.write_token(&chunk.delta).await {
                if err.is_cancellation() {
                    return self.cancel(session, channel);
                }
                return self.fail(session, channel, err.into()).await;
            }

            if let Err(err) = session.record_token(&chunk.delta) {
                return self
                    .fail(session, channel, RelayError::State(err.to_string()))
                    .await;
            }

            if let Err(err) = hooks.on_token(&chunk.delta).await {
                return self.fail(session, channel, err.into()).await;
            }

            return Transition::TokenForwarded(chunk.delta);
        }
    }

    async fn complete(
        &self,
        session: &mut StreamSession,
        hooks: &dyn StreamHooks,
        channel: &mut ResponseChannel,
    ) -> Transition {
        let text = match session.complete() {
            Ok(text) => text.to_string(),
            Err(err) => {
                return self
                    .fail(session, channel, RelayError::State(err.to_string()))
                    .await
            }
        };

        if let Err(err) = hooks.on_completion(&text).await {
            warn!(
                chat_id = %session.chat_id(),
                error = %err,
                "Completion hook failed after delivery"
            );
        }
        channel.close();

        info!(
            chat_id = %session.chat_id(),
            tokens = session.tokens_forwarded(),
            chars = text.len(),
            "Stream completed"
        );
        Transition::Completed
    }

    async fn fail(
        &self,
        session: &mut StreamSession,
        channel: &mut ResponseChannel,
        err: RelayError,
    ) -> Transition {
        if let Err(state_err) = session.fail() {
            warn!(chat_id = %session.chat_id(), error = %state_err, "Failing from unexpected state");
        }

        let payload = self.translator.translate(&err);
        error!(
            chat_id = %session.chat_id(),
            kind = %payload.kind,
            status = payload.status_code,
            message = %payload.message,
            tokens = session.tokens_forwarded(),
            "Stream failed"
        );

        if let Err(write_err) = channel.write_error(&payload.to_json()).await {
            warn!(chat_id = %session.chat_id(), error = %write_err, "Could not deliver error frame");
        }
        channel.close();

        Transition::Failed(payload)
    }

    fn cancel(&self, session: &mut StreamSession, channel: &mut ResponseChannel) -> Transition {
        if let Err(state_err) = session.cancel() {
            warn!(chat_id = %session.chat_id(), error = %state_err, "Cancelling from unexpected state");
        }
        channel.close();

        info!(
            chat_id = %session.chat_id(),
            tokens = session.tokens_forwarded(),
            "Client disconnected, stream cancelled"
        );
        Transition::Cancelled
    }
}

/// Ends the stream right after the first chunk carrying a finish reason,
/// releasing the provider stream without pulling again.
fn until_final(stream: CompletionStream) -> CompletionStream {
    futures::stream::unfold(Some(stream), |state| async move {
        let mut inner = state?;
        let item = inner.next().await?;
        let finished = matches!(&item, Ok(chunk) if chunk.is_final());
        Some((item, if finished { None } else { Some(inner) }))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockCompletionProvider;
    use crate::application::handlers::relay::response_channel::{ChannelConfig, FrameStream};
    use crate::domain::chat::{ChatMessage, StreamState};
    use crate::ports::{CompletionProvider, CompletionRequest, FinishReason, StreamChunk};
    use std::sync::Mutex;

    fn adapter(idle_ms: u64) -> StreamAdapter {
        StreamAdapter::new(
            Duration::from_millis(idle_ms),
            Arc::new(ErrorTranslator::new()),
        )
    }

    fn open_channel() -> (ResponseChannel, FrameStream) {
        ResponseChannel::open(&ChannelConfig {
            buffer: 16,
            write_timeout: Duration::from_secs(1),
        })
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-4", vec![ChatMessage::user("Hi")], 0.7)
    }

    #[derive(Default)]
    struct RecordingHooks {
        started: Mutex<bool>,
        tokens: Mutex<Vec<String>>,
        completions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StreamHooks for RecordingHooks {
        async fn on_start(&self) -> Result<(), HookError> {
            *self.started.lock().unwrap() = true;
            Ok(())
        }

        async fn on_token(&self, token: &str) -> Result<(), HookError> {
            self.tokens.lock().unwrap().push(token.to_string());
            Ok(())
        }

        async fn on_completion(&self, completion: &str) -> Result<(), HookError> {
            self.completions.lock().unwrap().push(completion.to_string());
            Ok(())
        }
    }

    fn error_payload(frame: &str) -> ErrorPayload {
        let json = frame
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let envelope: crate::application::handlers::relay::ErrorEnvelope =
            serde_json::from_str(json).unwrap();
        envelope.error
    }

    mod completing {
        use super::*;

        #[tokio::test]
        async fn forwards_tokens_in_order_and_reports_full_text() {
            let provider = MockCompletionProvider::new().with_tokens(["Hel", "lo"]);
            let hooks = RecordingHooks::default();
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &hooks, &mut channel)
                .await;

            assert_eq!(
                outcome,
                StreamOutcome::Completed {
                    text: "Hello".to_string(),
                    tokens: 2
                }
            );
            let received: Vec<String> = frames.collect().await;
            assert_eq!(received, vec!["data: Hel\n\n", "data: lo\n\n"]);
            assert!(*hooks.started.lock().unwrap());
            assert_eq!(*hooks.tokens.lock().unwrap(), vec!["Hel", "lo"]);
            assert_eq!(*hooks.completions.lock().unwrap(), vec!["Hello"]);
            assert!(channel.is_closed());
        }

        #[tokio::test]
        async fn empty_stream_completes_with_empty_text() {
            let provider = MockCompletionProvider::new();
            let hooks = RecordingHooks::default();
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &hooks, &mut channel)
                .await;

            assert_eq!(
                outcome,
                StreamOutcome::Completed {
                    text: String::new(),
                    tokens: 0
                }
            );
            assert!(frames.collect::<Vec<_>>().await.is_empty());
            assert_eq!(*hooks.completions.lock().unwrap(), vec![""]);
        }

        #[tokio::test]
        async fn final_chunk_text_is_forwarded_and_nothing_after_is_pulled() {
            let provider = MockCompletionProvider::new().with_chunks(vec![
                Ok(StreamChunk::content("Hi")),
                Ok(StreamChunk::final_chunk("!", FinishReason::Stop)),
                Ok(StreamChunk::content("ignored")),
            ]);
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &NoopHooks, &mut channel)
                .await;

            assert_eq!(
                outcome,
                StreamOutcome::Completed {
                    text: "Hi!".to_string(),
                    tokens: 2
                }
            );
            assert_eq!(frames.collect::<Vec<_>>().await.len(), 2);
            assert_eq!(provider.pulls(), 2);
        }

        #[tokio::test]
        async fn completion_hook_failure_keeps_completed_outcome() {
            struct FailingCompletion;

            #[async_trait]
            impl StreamHooks for FailingCompletion {
                async fn on_completion(&self, _completion: &str) -> Result<(), HookError> {
                    Err(HookError::new("disk full"))
                }
            }

            let provider = MockCompletionProvider::new().with_tokens(["ok"]);
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(
                    ChatId::new(),
                    provider.create_stream(request()),
                    &FailingCompletion,
                    &mut channel,
                )
                .await;

            assert!(matches!(outcome, StreamOutcome::Completed { .. }));
            assert_eq!(frames.collect::<Vec<_>>().await, vec!["data: ok\n\n"]);
        }
    }

    mod failing {
        use super::*;

        #[tokio::test]
        async fn provider_error_after_tokens_sends_one_error_frame() {
            let provider = MockCompletionProvider::new()
                .with_tokens(["a", "b"])
                .with_error(ProviderError::rate_limited(30));
            let hooks = RecordingHooks::default();
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &hooks, &mut channel)
                .await;

            let received: Vec<String> = frames.collect().await;
            assert_eq!(received.len(), 3);
            assert_eq!(received[0], "data: a\n\n");
            assert_eq!(received[1], "data: b\n\n");
            let payload = error_payload(&received[2]);
            assert_eq!(payload.status_code, 429);
            assert_eq!(payload.kind, "rate_limited");

            assert!(matches!(outcome, StreamOutcome::Failed { tokens: 2, .. }));
            assert!(hooks.completions.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn opening_failure_sends_error_frame_with_no_tokens() {
            let provider =
                MockCompletionProvider::new().with_error(ProviderError::AuthenticationFailed);
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &NoopHooks, &mut channel)
                .await;

            let received: Vec<String> = frames.collect().await;
            assert_eq!(received.len(), 1);
            assert_eq!(error_payload(&received[0]).status_code, 401);
            assert_eq!(outcome.tokens(), 0);
        }

        #[tokio::test]
        async fn idle_provider_times_out() {
            let provider = MockCompletionProvider::new().with_tokens(["a"]).stalling();
            let (mut channel, frames) = open_channel();

            let outcome = adapter(50)
                .start(ChatId::new(), provider.create_stream(request()), &NoopHooks, &mut channel)
                .await;

            let received: Vec<String> = frames.collect().await;
            assert_eq!(received.len(), 2);
            let payload = error_payload(&received[1]);
            assert_eq!(payload.kind, "provider_timeout");
            assert_eq!(payload.status_code, 504);
            assert!(matches!(outcome, StreamOutcome::Failed { tokens: 1, .. }));
        }

        #[tokio::test]
        async fn failing_start_hook_fails_before_any_pull() {
            struct FailingStart;

            #[async_trait]
            impl StreamHooks for FailingStart {
                async fn on_start(&self) -> Result<(), HookError> {
                    Err(HookError::new("nope"))
                }
            }

            let provider = MockCompletionProvider::new().with_tokens(["a"]);
            let (mut channel, frames) = open_channel();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &FailingStart, &mut channel)
                .await;

            let received: Vec<String> = frames.collect().await;
            assert_eq!(error_payload(&received[0]), ErrorPayload::internal());
            assert!(matches!(outcome, StreamOutcome::Failed { tokens: 0, .. }));
            assert_eq!(provider.pulls(), 0);
        }
    }

    mod cancelling {
        use super::*;

        /// Drops the client half once the given number of tokens went out.
        struct DisconnectAfter {
            limit: usize,
            seen: Mutex<usize>,
            frames: Mutex<Option<FrameStream>>,
            completions: Mutex<usize>,
        }

        #[async_trait]
        impl StreamHooks for DisconnectAfter {
            async fn on_token(&self, _token: &str) -> Result<(), HookError> {
                let mut seen = self.seen.lock().unwrap();
                *seen += 1;
                if *seen == self.limit {
                    self.frames.lock().unwrap().take();
                }
                Ok(())
            }

            async fn on_completion(&self, _completion: &str) -> Result<(), HookError> {
                *self.completions.lock().unwrap() += 1;
                Ok(())
            }
        }

        #[tokio::test]
        async fn disconnect_stops_pulling_and_skips_completion() {
            let provider = MockCompletionProvider::new().with_tokens(["1", "2", "3", "4", "5"]);
            let (mut channel, frames) = open_channel();
            let hooks = DisconnectAfter {
                limit: 2,
                seen: Mutex::new(0),
                frames: Mutex::new(Some(frames)),
                completions: Mutex::new(0),
            };

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &hooks, &mut channel)
                .await;

            assert_eq!(outcome, StreamOutcome::Cancelled { tokens: 2 });
            assert_eq!(provider.pulls(), 2);
            assert!(provider.released());
            assert_eq!(*hooks.completions.lock().unwrap(), 0);
            assert!(channel.is_closed());
        }

        #[tokio::test]
        async fn stalled_reader_times_out_write_and_cancels() {
            let provider = MockCompletionProvider::new().with_tokens(["1", "2", "3", "4"]);
            let (mut channel, frames) = ResponseChannel::open(&ChannelConfig {
                buffer: 1,
                write_timeout: Duration::from_millis(20),
            });
            let hooks = RecordingHooks::default();

            let outcome = adapter(1000)
                .start(ChatId::new(), provider.create_stream(request()), &hooks, &mut channel)
                .await;

            assert_eq!(outcome, StreamOutcome::Cancelled { tokens: 1 });
            assert_eq!(provider.pulls(), 2);
            assert!(provider.released());
            assert!(hooks.completions.lock().unwrap().is_empty());
            assert!(channel.is_closed());

            let sent: Vec<String> = frames.collect().await;
            assert_eq!(sent, vec!["data: 1\n\n".to_string()]);
        }
    }

    mod stepping {
        use super::*;

        #[tokio::test]
        async fn each_step_yields_one_transition() {
            let provider = MockCompletionProvider::new().with_tokens(["x"]);
            let (mut channel, _frames) = open_channel();
            let mut session = StreamSession::new(ChatId::new());
            session.begin().unwrap();
            let mut stream = provider.create_stream(request());
            let adapter = adapter(1000);

            let first = adapter
                .step(&mut session, &mut stream, &NoopHooks, &mut channel)
                .await;
            assert_eq!(first, Transition::TokenForwarded("x".to_string()));
            assert!(!first.is_terminal());

            let second = adapter
                .step(&mut session, &mut stream, &NoopHooks, &mut channel)
                .await;
            assert_eq!(second, Transition::Completed);
            assert_eq!(session.state(), StreamState::Completed);
        }
    }
}
