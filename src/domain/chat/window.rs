//! Conversation window: the bounded slice of stored history sent as context.

use crate::domain::foundation::ValidationError;

use super::{ChatMessage, Role, StoredMessage};

/// Stored system message (if any) plus the most recent non-system history.
///
/// # Invariants
///
/// - at most one system message, and it is always first
/// - history holds no system messages
/// - history is strictly increasing by `sequence` (chronological, no duplicates)
/// - history length ≤ 2 × `max_pairs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationWindow {
    system: Option<StoredMessage>,
    history: Vec<StoredMessage>,
}

impl ConversationWindow {
    /// Builds a window, checking every invariant.
    pub fn new(
        system: Option<StoredMessage>,
        history: Vec<StoredMessage>,
        max_pairs: usize,
    ) -> Result<Self, ValidationError> {
        if let Some(ref message) = system {
            if message.role != Role::System {
                return Err(ValidationError::invalid_format(
                    "window.system",
                    format!("expected system role, got {}", message.role),
                ));
            }
        }

        if history.iter().any(|m| m.role.is_system()) {
            return Err(ValidationError::invalid_format(
                "window.history",
                "system messages are not allowed in history",
            ));
        }

        if history.windows(2).any(|pair| pair[0].sequence >= pair[1].sequence) {
            return Err(ValidationError::invalid_format(
                "window.history",
                "history must be strictly chronological",
            ));
        }

        let limit = max_pairs.saturating_mul(2);
        if history.len() > limit {
            return Err(ValidationError::too_long("window.history", limit, history.len()));
        }

        Ok(Self { system, history })
    }

    /// A window with no stored messages.
    pub fn empty() -> Self {
        Self {
            system: None,
            history: Vec::new(),
        }
    }

    pub fn system(&self) -> Option<&StoredMessage> {
        self.system.as_ref()
    }

    pub fn history(&self) -> &[StoredMessage] {
        &self.history
    }

    /// Total messages including the system message.
    pub fn len(&self) -> usize {
        self.history.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// History as provider-facing messages, oldest first.
    pub fn history_messages(&self) -> Vec<ChatMessage> {
        self.history.iter().map(StoredMessage::to_chat_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ChatId, MessageId, Timestamp};

    fn stored(role: Role, content: &str, sequence: i64) -> StoredMessage {
        StoredMessage {
            id: MessageId::new(),
            chat_id: ChatId::new(),
            role,
            content: content.to_string(),
            sequence,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn accepts_system_plus_chronological_pairs() {
        let window = ConversationWindow::new(
            Some(stored(Role::System, "persona", 1)),
            vec![stored(Role::User, "hi", 2), stored(Role::Assistant, "hello", 3)],
            1,
        )
        .unwrap();

        assert_eq!(window.len(), 3);
        assert_eq!(
            window.history_messages(),
            vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")]
        );
    }

    #[test]
    fn rejects_non_system_in_system_slot() {
        let result = ConversationWindow::new(Some(stored(Role::User, "x", 1)), vec![], 1);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_system_in_history() {
        let result =
            ConversationWindow::new(None, vec![stored(Role::System, "persona", 1)], 1);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_out_of_order_or_duplicate_history() {
        let out_of_order = ConversationWindow::new(
            None,
            vec![stored(Role::User, "b", 5), stored(Role::Assistant, "a", 4)],
            2,
        );
        assert!(out_of_order.is_err());

        let duplicate = ConversationWindow::new(
            None,
            vec![stored(Role::User, "a", 4), stored(Role::User, "a", 4)],
            2,
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn rejects_history_longer_than_pair_limit() {
        let history = (1..=3).map(|i| stored(Role::User, "m", i)).collect();
        let err = ConversationWindow::new(None, history, 1).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 2, actual: 3, .. }));
    }

    #[test]
    fn empty_window_has_no_messages() {
        let window = ConversationWindow::empty();
        assert!(window.is_empty());
        assert!(window.system().is_none());
        assert!(window.history_messages().is_empty());
    }
}
