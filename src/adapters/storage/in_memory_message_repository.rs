//! In-Memory Message Repository Adapter
//!
//! Stores chat messages in memory. Used when no database is configured and
//! throughout the test suite.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::chat::{Role, StoredMessage};
use crate::domain::foundation::{ChatId, MessageId, Timestamp};
use crate::ports::{MessageRepository, RepositoryError};

#[derive(Debug, Default)]
struct Store {
    chats: HashMap<ChatId, Vec<StoredMessage>>,
    next_sequence: i64,
}

/// In-memory storage for chat messages.
///
/// All writes go through one lock, so sequences are strictly increasing
/// within every chat even under concurrent turns.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessageRepository {
    store: Arc<RwLock<Store>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    failing_reads: Arc<AtomicBool>,
    failing_writes: Arc<AtomicBool>,
}

impl InMemoryMessageRepository {
    /// Create a new, empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages of a chat, oldest first
    pub async fn messages_for(&self, chat_id: &ChatId) -> Vec<StoredMessage> {
        self.store
            .read()
            .await
            .chats
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Successful creates and updates so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Read operations so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Make every read fail (useful for tests)
    pub fn fail_reads(&self, fail: bool) {
        self.failing_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail (useful for tests)
    pub fn fail_writes(&self, fail: bool) {
        self.failing_writes.store(fail, Ordering::SeqCst);
    }

    fn begin_read(&self) -> Result<(), RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn begin_write(&self) -> Result<(), RepositoryError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn find_system_message(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<StoredMessage>, RepositoryError> {
        self.begin_read()?;
        let store = self.store.read().await;
        Ok(store
            .chats
            .get(chat_id)
            .and_then(|messages| messages.iter().rev().find(|m| m.role.is_system()))
            .cloned())
    }

    async fn find_recent_messages(
        &self,
        chat_id: &ChatId,
        exclude_system: bool,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        self.begin_read()?;
        let store = self.store.read().await;
        let Some(messages) = store.chats.get(chat_id) else {
            return Ok(Vec::new());
        };

        let mut recent: Vec<StoredMessage> = messages
            .iter()
            .rev()
            .filter(|m| !(exclude_system && m.role.is_system()))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn create_message(
        &self,
        chat_id: &ChatId,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, RepositoryError> {
        self.begin_write()?;
        let mut store = self.store.write().await;

        if role.is_system() {
            let existing = store
                .chats
                .get_mut(chat_id)
                .and_then(|messages| messages.iter_mut().find(|m| m.role.is_system()));
            if let Some(existing) = existing {
                existing.content = content.to_string();
                let message = existing.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                return Ok(message);
            }
        }

        store.next_sequence += 1;
        let message = StoredMessage {
            id: MessageId::new(),
            chat_id: *chat_id,
            role,
            content: content.to_string(),
            sequence: store.next_sequence,
            created_at: Timestamp::now(),
        };
        store
            .chats
            .entry(*chat_id)
            .or_default()
            .push(message.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(message)
    }

    async fn update_message(&self, id: &MessageId, content: &str) -> Result<(), RepositoryError> {
        self.begin_write()?;
        let mut store = self.store.write().await;
        let message = store
            .chats
            .values_mut()
            .flat_map(|messages| messages.iter_mut())
            .find(|m| m.id == *id)
            .ok_or(RepositoryError::NotFound(*id))?;
        message.content = content.to_string();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
