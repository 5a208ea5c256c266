//! Chat module - messages, conversation windows and stream sessions.

mod message;
mod session;
mod window;

pub use message::{ChatMessage, Role, StoredMessage};
pub use session::{StreamSession, StreamState};
pub use window::ConversationWindow;
