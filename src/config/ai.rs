//! AI provider configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// AI provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Which chat-completions flavour to address
    #[serde(default = "default_provider")]
    pub provider: AiProvider,

    /// API key (Azure `api-key` header or OpenAI bearer token)
    pub api_key: Option<Secret<String>>,

    /// Azure resource endpoint, or the OpenAI base URL
    pub endpoint: Option<String>,

    /// Azure deployment name
    pub deployment: Option<String>,

    /// Azure API version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Longest wait for the next streamed token, in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// AI provider type
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAI,
    #[default]
    Azure,
}

impl AiConfig {
    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// The API key, if one is set and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .filter(|k| !k.trim().is_empty())
    }

    /// The endpoint, if one is set and non-blank
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Whether enough is configured to reach the provider.
    ///
    /// Azure needs a key, an endpoint and a deployment; OpenAI only a key.
    pub fn credentials_present(&self) -> bool {
        if self.api_key().is_none() {
            return false;
        }
        match self.provider {
            AiProvider::OpenAI => true,
            AiProvider::Azure => {
                self.endpoint().is_some()
                    && self.deployment.as_deref().is_some_and(|d| !d.trim().is_empty())
            }
        }
    }

    /// Validate AI configuration
    ///
    /// Missing credentials are not an error here; turns fail individually.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidTemperature);
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("ai.connect_timeout_secs"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("ai.idle_timeout_secs"));
        }
        Ok(())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            model: default_model(),
            temperature: default_temperature(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_provider() -> AiProvider {
    AiProvider::Azure
}

fn default_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    60
}
