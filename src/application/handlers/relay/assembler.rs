//! Conversation assembly: stored history + incoming turn = provider context.

use std::sync::Arc;
use tracing::debug;

use crate::domain::chat::{ChatMessage, ConversationWindow, Role, StoredMessage};
use crate::domain::foundation::ChatId;
use crate::ports::{MessageRepository, RepositoryError};

use super::errors::RelayError;

/// Builds the ordered message list sent to the completion provider.
pub struct ConversationAssembler {
    repository: Arc<dyn MessageRepository>,
    default_persona: String,
}

impl ConversationAssembler {
    pub fn new(repository: Arc<dyn MessageRepository>, default_persona: impl Into<String>) -> Self {
        Self {
            repository,
            default_persona: default_persona.into(),
        }
    }

    /// Loads the stored system message and the `2 × max_pairs` most recent
    /// non-system messages, oldest first.
    pub async fn fetch_window(
        &self,
        chat_id: &ChatId,
        max_pairs: usize,
    ) -> Result<ConversationWindow, RelayError> {
        let system = self.repository.find_system_message(chat_id).await?;
        let limit = max_pairs.saturating_mul(2);
        let mut history = self
            .repository
            .find_recent_messages(chat_id, true, limit)
            .await?;

        normalize_history(&mut history, limit);

        ConversationWindow::new(system, history, max_pairs)
            .map_err(|err| RepositoryError::Corrupt(err.to_string()).into())
    }

    /// Merges the stored window with the incoming messages.
    ///
    /// The incoming system message wins and is written back to storage only
    /// when it differs from the stored one. Without any system message the
    /// default persona is used (and not stored). Incoming non-system messages
    /// follow the stored history in their original order.
    pub async fn merge_with_incoming(
        &self,
        chat_id: &ChatId,
        window: &ConversationWindow,
        incoming: &[ChatMessage],
    ) -> Result<Vec<ChatMessage>, RelayError> {
        let incoming_system = incoming.iter().find(|m| m.role.is_system());

        let system = match (incoming_system, window.system()) {
            (Some(fresh), Some(stored)) => {
                if stored.content != fresh.content {
                    self.repository
                        .update_message(&stored.id, &fresh.content)
                        .await?;
                    debug!(chat_id = %chat_id, "System message updated");
                }
                fresh.clone()
            }
            (Some(fresh), None) => {
                self.repository
                    .create_message(chat_id, Role::System, &fresh.content)
                    .await?;
                debug!(chat_id = %chat_id, "System message stored");
                fresh.clone()
            }
            (None, Some(stored)) => stored.to_chat_message(),
            (None, None) => ChatMessage::system(self.default_persona.clone()),
        };

        let mut messages = Vec::with_capacity(1 + window.len() + incoming.len());
        messages.push(system);
        messages.extend(window.history_messages());
        messages.extend(incoming.iter().filter(|m| !m.role.is_system()).cloned());

        Ok(messages)
    }
}

/// Orders by sequence, drops duplicates and keeps only the newest `limit`.
fn normalize_history(history: &mut Vec<StoredMessage>, limit: usize) {
    history.sort_by_key(|m| m.sequence);
    history.dedup_by_key(|m| m.sequence);
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
}
