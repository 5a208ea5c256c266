//! Errors raised while relaying a chat turn.

use thiserror::Error;

use crate::domain::foundation::ValidationError;
use crate::ports::{ProviderError, RepositoryError};

use super::response_channel::ChannelError;
use super::stream_adapter::HookError;

/// Every way a turn can fail, before or during streaming.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Malformed turn request; rejected before any side effect.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Provider credentials or endpoint missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Upstream provider failed (including idle timeout).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Message store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    /// A lifecycle hook failed.
    #[error("Hook failed: {0}")]
    Hook(#[from] HookError),

    /// Outbound channel failed for a reason other than client disconnect.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Stream session rejected a transition.
    #[error("Invalid stream state: {0}")]
    State(String),
}

impl RelayError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_provider_errors() {
        let err: RelayError = ProviderError::rate_limited(5).into();
        assert!(matches!(err, RelayError::Provider(ProviderError::RateLimited { .. })));
        assert_eq!(err.to_string(), "Provider error: rate limited: retry after 5s");
    }

    #[test]
    fn wraps_validation_errors() {
        let err: RelayError = ValidationError::empty_field("messages").into();
        assert_eq!(
            err.to_string(),
            "Validation failed: Field 'messages' cannot be empty"
        );
    }
}
