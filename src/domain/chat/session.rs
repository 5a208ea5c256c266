//! Stream session: the ephemeral state of one relayed turn.
//!
//! A session lives exactly as long as one provider stream. It accumulates the
//! tokens that reached the client and records which terminal state the turn
//! ended in. It is never persisted; only the completed text is.

use serde::Serialize;

use crate::domain::foundation::{ChatId, StateMachine, ValidationError};

/// Lifecycle of a stream session.
///
/// `Init → Streaming → {Completed | Failed | Cancelled}`; the three terminal
/// states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    #[default]
    Init,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StateMachine for StreamState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use StreamState::*;
        matches!(
            (self, target),
            (Init, Streaming) | (Streaming, Completed) | (Streaming, Failed) | (Streaming, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use StreamState::*;
        match self {
            Init => vec![Streaming],
            Streaming => vec![Completed, Failed, Cancelled],
            Completed | Failed | Cancelled => vec![],
        }
    }
}

/// One turn's streaming state.
///
/// # Invariants
///
/// - `text` is exactly the in-order concatenation of every token recorded
/// - tokens can only be recorded while `Streaming`
/// - once terminal, the state never changes again
#[derive(Debug, Clone)]
pub struct StreamSession {
    chat_id: ChatId,
    text: String,
    tokens: usize,
    state: StreamState,
}

impl StreamSession {
    /// Creates a session in `Init`.
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            text: String::new(),
            tokens: 0,
            state: StreamState::Init,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text delivered to the client so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of token frames delivered so far.
    pub fn tokens_forwarded(&self) -> usize {
        self.tokens
    }

    /// `Init → Streaming`.
    pub fn begin(&mut self) -> Result<(), ValidationError> {
        self.state = self.state.transition_to(StreamState::Streaming)?;
        Ok(())
    }

    /// Appends a token that has already been written to the client.
    pub fn record_token(&mut self, token: &str) -> Result<(), ValidationError> {
        if self.state != StreamState::Streaming {
            return Err(ValidationError::invalid_format(
                "stream_session",
                format!("cannot record tokens in {:?}", self.state),
            ));
        }
        self.text.push_str(token);
        self.tokens += 1;
        Ok(())
    }

    /// `Streaming → Completed`, returning the full text.
    pub fn complete(&mut self) -> Result<&str, ValidationError> {
        self.state = self.state.transition_to(StreamState::Completed)?;
        Ok(&self.text)
    }

    /// `Streaming → Failed`.
    pub fn fail(&mut self) -> Result<(), ValidationError> {
        self.state = self.state.transition_to(StreamState::Failed)?;
        Ok(())
    }

    /// `Streaming → Cancelled`.
    pub fn cancel(&mut self) -> Result<(), ValidationError> {
        self.state = self.state.transition_to(StreamState::Cancelled)?;
        Ok(())
    }
}
