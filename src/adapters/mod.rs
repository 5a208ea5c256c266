//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `ai` - Chat-completion providers (OpenAI/Azure, scripted mock)
//! - `http` - Axum routes and handlers
//! - `postgres` - PostgreSQL message storage
//! - `storage` - In-memory message storage

pub mod ai;
pub mod http;
pub mod postgres;
pub mod storage;

pub use ai::{MockCompletionProvider, OpenAIConfig, OpenAIProvider};
pub use http::{chat_router, ChatAppState};
pub use postgres::PostgresMessageRepository;
pub use storage::InMemoryMessageRepository;
