//! HTTP DTOs for chat endpoints
//!
//! These types decouple the HTTP API from domain types, allowing independent evolution.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::application::handlers::relay::RelayTurnCommand;
use crate::domain::chat::{ChatMessage, Role};
use crate::domain::foundation::{ChatId, ValidationError};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to relay one chat turn
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub chat_id: String,
    #[serde(default)]
    pub messages: Vec<TurnMessage>,
}

/// One message of a turn request
#[derive(Debug, Clone, Deserialize)]
pub struct TurnMessage {
    pub role: String,
    pub content: String,
}

impl TurnRequest {
    /// Converts to a validated command.
    pub fn into_command(self) -> Result<RelayTurnCommand, ValidationError> {
        let chat_id = ChatId::parse(&self.chat_id)?;
        let messages = self
            .messages
            .into_iter()
            .map(|m| Ok(ChatMessage::new(Role::from_str(&m.role)?, m.content)))
            .collect::<Result<Vec<_>, ValidationError>>()?;

        RelayTurnCommand::new(chat_id, messages)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for the health probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> TurnRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_camel_case_request() {
        let req = request(
            r#"{"chatId":"6f2c1d2e-8a51-4d7c-9a3e-2b1c0d9e8f7a","messages":[{"role":"user","content":"Hi"}]}"#,
        );

        let cmd = req.into_command().unwrap();

        assert_eq!(
            cmd.chat_id().to_string(),
            "6f2c1d2e-8a51-4d7c-9a3e-2b1c0d9e8f7a"
        );
        assert_eq!(cmd.messages(), &[ChatMessage::user("Hi")]);
    }

    #[test]
    fn rejects_non_uuid_chat_id() {
        let err = request(r#"{"chatId":"c1","messages":[{"role":"user","content":"Hi"}]}"#)
            .into_command()
            .unwrap_err();

        assert_eq!(err, ValidationError::invalid_format("chatId", "must be a UUID"));
    }

    #[test]
    fn rejects_unknown_role() {
        let err = request(
            r#"{"chatId":"6f2c1d2e-8a51-4d7c-9a3e-2b1c0d9e8f7a","messages":[{"role":"tool","content":"x"}]}"#,
        )
        .into_command()
        .unwrap_err();

        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == "role"));
    }

    #[test]
    fn missing_messages_is_empty_field() {
        let err = request(r#"{"chatId":"6f2c1d2e-8a51-4d7c-9a3e-2b1c0d9e8f7a"}"#)
            .into_command()
            .unwrap_err();

        assert_eq!(err, ValidationError::empty_field("messages"));
    }

    #[test]
    fn health_serializes() {
        let json = serde_json::to_string(&HealthResponse::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }
}
