//! Message repository port.
//!
//! Defines the contract for reading and writing chat messages. The relay only
//! ever touches storage through these four operations.
//!
//! # Design
//!
//! - **Chat-scoped**: every message belongs to exactly one chat
//! - **Ordered**: implementations assign a monotonically increasing sequence
//!   per chat and serialize writes so history never interleaves out of order
//! - **Narrow**: no deletes, no bulk rewrites

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::{Role, StoredMessage};
use crate::domain::foundation::{ChatId, MessageId};

/// Repository port for chat message persistence.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Finds the chat's system message, if one was stored.
    async fn find_system_message(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<StoredMessage>, RepositoryError>;

    /// Returns the `limit` most recent messages of the chat in chronological
    /// order (oldest first). System messages are skipped when
    /// `exclude_system` is set.
    async fn find_recent_messages(
        &self,
        chat_id: &ChatId,
        exclude_system: bool,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Appends a message, assigning its id and sequence.
    ///
    /// A chat holds at most one system message: creating one when it already
    /// exists overwrites the stored content and returns the existing row.
    async fn create_message(
        &self,
        chat_id: &ChatId,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, RepositoryError>;

    /// Replaces the content of an existing message.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no message has this id
    async fn update_message(&self, id: &MessageId, content: &str) -> Result<(), RepositoryError>;
}

/// Repository error.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
