//! Application configuration module
//!
//! Configuration is read from environment variables with the `CHAT_RELAY`
//! prefix, using `__` between nested keys. A `.env` file is loaded first if
//! present.
//!
//! # Example
//!
//! ```no_run
//! use chat_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod ai;
mod chat;
mod database;
mod error;
mod server;

pub use ai::{AiConfig, AiProvider};
pub use chat::ChatConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

use crate::application::handlers::relay::RelaySettings;

/// Root application configuration
///
/// Every section has defaults, so an empty environment loads successfully.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Completion provider configuration (OpenAI/Azure)
    #[serde(default)]
    pub ai: AiConfig,

    /// Conversation window and response streaming
    #[serde(default)]
    pub chat: ChatConfig,

    /// Message storage (PostgreSQL, optional)
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Environment Variable Format
    ///
    /// - `CHAT_RELAY__SERVER__PORT=8000` -> `server.port = 8000`
    /// - `CHAT_RELAY__AI__API_KEY=...` -> `ai.api_key = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHAT_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.ai.validate()?;
        self.chat.validate()?;
        self.database.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }

    /// Settings handed to the relay core.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            max_conversation_pairs: self.chat.max_conversation_pairs,
            temperature: self.ai.temperature,
            model: self.ai.model.clone(),
            default_persona: self.chat.default_persona.clone(),
            idle_timeout: self.ai.idle_timeout(),
            write_timeout: self.chat.write_timeout(),
            channel_buffer: self.chat.channel_buffer,
        }
    }
}
