//! PostgreSQL implementation of MessageRepository.
//!
//! Messages live in `chat_messages`; `sequence` (BIGSERIAL) is the ordering
//! key. Writes for one chat are serialized with a transaction-scoped advisory
//! lock keyed on the chat id. A partial unique index keeps one system
//! message per chat.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

use crate::domain::chat::{Role, StoredMessage};
use crate::domain::foundation::{ChatId, MessageId, Timestamp};
use crate::ports::{MessageRepository, RepositoryError};

/// PostgreSQL implementation of MessageRepository.
#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    /// Creates a new PostgresMessageRepository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, runs pending migrations and returns the repository.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to connect: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to run migrations: {}", e)))?;
        info!("Database migrations applied");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn find_system_message(
        &self,
        chat_id: &ChatId,
    ) -> Result<Option<StoredMessage>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, chat_id, role, content, sequence, created_at
            FROM chat_messages
            WHERE chat_id = $1 AND role = 'system'
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(chat_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to fetch system message: {}", e)))?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn find_recent_messages(
        &self,
        chat_id: &ChatId,
        exclude_system: bool,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, chat_id, role, content, sequence, created_at
            FROM (
                SELECT id, chat_id, role, content, sequence, created_at
                FROM chat_messages
                WHERE chat_id = $1 AND (NOT $2 OR role <> 'system')
                ORDER BY sequence DESC
                LIMIT $3
            ) recent
            ORDER BY sequence ASC
            "#,
        )
        .bind(chat_id.as_uuid())
        .bind(exclude_system)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to fetch messages: {}", e)))?;

        rows.iter().map(row_to_message).collect()
    }

    async fn create_message(
        &self,
        chat_id: &ChatId,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            RepositoryError::Database(format!("Failed to start transaction: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(chat_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to lock chat: {}", e)))?;

        // A repeated system message lands on the partial unique index and
        // overwrites the stored one.
        let row = sqlx::query(
            r#"
            INSERT INTO chat_messages (id, chat_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chat_id) WHERE role = 'system'
            DO UPDATE SET content = EXCLUDED.content
            RETURNING id, chat_id, role, content, sequence, created_at
            "#,
        )
        .bind(MessageId::new().as_uuid())
        .bind(chat_id.as_uuid())
        .bind(role.as_str())
        .bind(content)
        .bind(Timestamp::now().as_datetime())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert message: {}", e)))?;

        tx.commit().await.map_err(|e| {
            RepositoryError::Database(format!("Failed to commit transaction: {}", e))
        })?;

        row_to_message(&row)
    }

    async fn update_message(&self, id: &MessageId, content: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE chat_messages SET content = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(format!("Failed to update message: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(*id));
        }
        Ok(())
    }
}

fn row_to_message(row: &PgRow) -> Result<StoredMessage, RepositoryError> {
    let corrupt = |e: sqlx::Error| RepositoryError::Corrupt(e.to_string());

    let id: uuid::Uuid = row.try_get("id").map_err(corrupt)?;
    let chat_id: uuid::Uuid = row.try_get("chat_id").map_err(corrupt)?;
    let role: String = row.try_get("role").map_err(corrupt)?;
    let content: String = row.try_get("content").map_err(corrupt)?;
    let sequence: i64 = row.try_get("sequence").map_err(corrupt)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(corrupt)?;

    Ok(StoredMessage {
        id: MessageId::from_uuid(id),
        chat_id: ChatId::from_uuid(chat_id),
        role: Role::from_str(&role).map_err(|e| RepositoryError::Corrupt(e.to_string()))?,
        content,
        sequence,
        created_at: Timestamp::from_datetime(created_at),
    })
}
