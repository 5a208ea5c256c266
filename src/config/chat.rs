//! Chat relay configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Chat relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Prior user/assistant pairs included in each request
    #[serde(default = "default_max_conversation_pairs")]
    pub max_conversation_pairs: usize,

    /// System prompt used when a chat has none
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Longest wait for the client to accept a frame, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Frames buffered per response before writes wait
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl ChatConfig {
    /// Get write timeout as Duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Validate chat configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_conversation_pairs == 0 {
            return Err(ValidationError::InvalidConversationPairs);
        }
        if self.write_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("chat.write_timeout_secs"));
        }
        if self.channel_buffer == 0 {
            return Err(ValidationError::InvalidChannelBuffer);
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_conversation_pairs: default_max_conversation_pairs(),
            default_persona: default_persona(),
            write_timeout_secs: default_write_timeout(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

fn default_max_conversation_pairs() -> usize {
    50
}

fn default_persona() -> String {
    crate::application::handlers::relay::DEFAULT_PERSONA.to_string()
}

fn default_write_timeout() -> u64 {
    30
}

fn default_channel_buffer() -> usize {
    32
}
