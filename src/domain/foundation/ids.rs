//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Identifier of a chat session (one conversation thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(Uuid);

impl ChatId {
    /// Creates a new random ChatId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ChatId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a ChatId, reporting a field-level validation error on failure.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        value
            .parse()
            .map_err(|_| ValidationError::invalid_format("chatId", "must be a UUID"))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identifier of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random MessageId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a MessageId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod chat_id {
        use super::*;

        #[test]
        fn generates_unique_ids() {
            assert_ne!(ChatId::new(), ChatId::new());
        }

        #[test]
        fn round_trips_through_display() {
            let id = ChatId::new();
            let parsed: ChatId = id.to_string().parse().unwrap();
            assert_eq!(id, parsed);
        }

        #[test]
        fn parse_rejects_non_uuid() {
            let err = ChatId::parse("c1").unwrap_err();
            assert_eq!(
                err.to_string(),
                "Field 'chatId' has invalid format: must be a UUID"
            );
        }

        #[test]
        fn serializes_as_bare_uuid() {
            let uuid = Uuid::new_v4();
            let json = serde_json::to_string(&ChatId::from_uuid(uuid)).unwrap();
            assert_eq!(json, format!("\"{}\"", uuid));
        }
    }

    mod message_id {
        use super::*;

        #[test]
        fn displays_as_uuid() {
            let id = MessageId::new();
            assert_eq!(id.to_string().len(), 36);
        }

        #[test]
        fn from_uuid_preserves_value() {
            let uuid = Uuid::new_v4();
            assert_eq!(MessageId::from_uuid(uuid).as_uuid(), &uuid);
        }
    }
}
