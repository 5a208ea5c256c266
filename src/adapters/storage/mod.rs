//! Storage Adapters
//!
//! In-process implementations of the MessageRepository port.
//!
//! ## Available Adapters
//!
//! - **InMemoryMessageRepository** - Stores messages in memory (testing/development)
//!
//! For durable storage see `adapters::postgres::PostgresMessageRepository`.

mod in_memory_message_repository;

pub use in_memory_message_repository::InMemoryMessageRepository;
