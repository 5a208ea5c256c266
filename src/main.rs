//! Chat relay server entry point.

use std::sync::Arc;

use http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use chat_relay::adapters::{
    chat_router, ChatAppState, InMemoryMessageRepository, OpenAIConfig, OpenAIProvider,
    PostgresMessageRepository,
};
use chat_relay::application::handlers::relay::{ErrorTranslator, RelayTurnHandler};
use chat_relay::config::{AiConfig, AiProvider, AppConfig, ServerConfig};
use chat_relay::ports::{CompletionProvider, MessageRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    info!(
        environment = ?config.server.environment,
        provider = ?config.ai.provider,
        "Starting chat relay"
    );

    let repository: Arc<dyn MessageRepository> = match config.database.url() {
        Some(url) => {
            Arc::new(PostgresMessageRepository::connect(url, config.database.max_connections).await?)
        }
        None => {
            warn!("No database configured, messages are kept in memory");
            Arc::new(InMemoryMessageRepository::new())
        }
    };

    let provider = build_provider(&config.ai)?;
    if provider.is_none() {
        warn!("Completion provider credentials missing, every turn will fail");
    }

    let mut translator = ErrorTranslator::new();
    if let Some(key) = config.ai.api_key() {
        translator = translator.with_secret(key);
    }
    if let Some(endpoint) = config.ai.endpoint() {
        translator = translator.with_secret(endpoint);
    }

    let relay = RelayTurnHandler::new(provider, repository, translator, config.relay_settings());
    let app = chat_router(ChatAppState::new(Arc::new(relay)))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&server.log_level));

    if server.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_line_number(true)
            .init();
    }
}

fn build_provider(
    ai: &AiConfig,
) -> Result<Option<Arc<dyn CompletionProvider>>, Box<dyn std::error::Error>> {
    if !ai.credentials_present() {
        return Ok(None);
    }
    let Some(key) = ai.api_key() else {
        return Ok(None);
    };

    let mut provider_config = OpenAIConfig::new(key)
        .with_model(ai.model.clone())
        .with_connect_timeout(ai.connect_timeout());
    if let Some(endpoint) = ai.endpoint() {
        provider_config = provider_config.with_base_url(endpoint.trim_end_matches('/'));
    }
    if ai.provider == AiProvider::Azure {
        let deployment = ai.deployment.clone().unwrap_or_default();
        provider_config = provider_config.with_azure_deployment(deployment, ai.api_version.clone());
    }

    Ok(Some(Arc::new(OpenAIProvider::new(provider_config)?)))
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
