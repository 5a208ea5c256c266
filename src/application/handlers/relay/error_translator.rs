//! Maps relay failures to client-facing error payloads.
//!
//! Payload shape on the wire:
//!
//! ```json
//! {"error": {"message": "...", "type": "rate_limited", "statusCode": 429}}
//! ```
//!
//! Messages are scrubbed of URLs, credential fragments and any configured
//! secret before they leave the process.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::RelayError;

/// Message used for every failure we do not classify.
pub const INTERNAL_ERROR_MESSAGE: &str = "Failed to process chat request";

const MAX_MESSAGE_CHARS: usize = 512;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?|wss?)://[^\s"'<>]+"#).expect("valid url pattern")
});

static BEARER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").expect("valid bearer pattern")
});

static CREDENTIAL_PAIR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(api[-_]?key|access[-_]?token|secret|password)(["']?\s*[:=]\s*["']?)[^\s"',;&]+"#,
    )
    .expect("valid credential pattern")
});

static SECRET_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsk-[A-Za-z0-9_-]{8,}").expect("valid key pattern"));

/// Client-facing error description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

/// Wrapper object the payload is sent in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>, kind: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            status_code,
        }
    }

    /// The generic payload for unclassified failures.
    pub fn internal() -> Self {
        Self::new(INTERNAL_ERROR_MESSAGE, "internal_error", 500)
    }

    /// Serializes the enveloped payload for an error frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&ErrorEnvelope::from(self.clone())).unwrap_or_else(|_| {
            format!(
                r#"{{"error":{{"message":"{}","type":"internal_error","statusCode":500}}}}"#,
                INTERNAL_ERROR_MESSAGE
            )
        })
    }
}

impl From<ErrorPayload> for ErrorEnvelope {
    fn from(error: ErrorPayload) -> Self {
        Self { error }
    }
}

/// Translates [`RelayError`]s into sanitized [`ErrorPayload`]s.
#[derive(Debug, Clone, Default)]
pub struct ErrorTranslator {
    secrets: Vec<String>,
}

impl ErrorTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a literal value (API key, endpoint) that must never appear in a payload.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Builds the client payload for an error.
    pub fn translate(&self, error: &RelayError) -> ErrorPayload {
        match error {
            RelayError::Provider(provider) => ErrorPayload::new(
                self.sanitize(&provider.to_string()),
                provider.kind(),
                provider.status_code(),
            ),
            RelayError::Validation(validation) => ErrorPayload::new(
                self.sanitize(&validation.to_string()),
                "validation_error",
                400,
            ),
            RelayError::Configuration(_) => ErrorPayload::new(
                "Chat completion provider is not configured",
                "configuration_error",
                500,
            ),
            RelayError::Persistence(_)
            | RelayError::Hook(_)
            | RelayError::Channel(_)
            | RelayError::State(_) => ErrorPayload::internal(),
        }
    }

    /// Removes URLs, credential fragments and registered secrets from a message.
    pub fn sanitize(&self, message: &str) -> String {
        let mut cleaned = message.to_string();
        for secret in &self.secrets {
            cleaned = cleaned.replace(secret.as_str(), "[redacted]");
        }

        let cleaned = URL_PATTERN.replace_all(&cleaned, "[redacted-url]");
        let cleaned = BEARER_PATTERN.replace_all(&cleaned, "Bearer [redacted]");
        let cleaned = CREDENTIAL_PAIR_PATTERN.replace_all(&cleaned, "${1}${2}[redacted]");
        let cleaned = SECRET_KEY_PATTERN.replace_all(&cleaned, "[redacted]");

        if cleaned.chars().count() > MAX_MESSAGE_CHARS {
            let truncated: String = cleaned.chars().take(MAX_MESSAGE_CHARS).collect();
            format!("{}...", truncated)
        } else {
            cleaned.into_owned()
        }
    }
}
