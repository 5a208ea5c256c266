//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresMessageRepository` - Chat message persistence with per-chat ordering

mod message_repository;

pub use message_repository::PostgresMessageRepository;
