//! Server initialization
//!
//! Wires configuration, providers, the credential gate and the router,
//! then serves until Ctrl+C or SIGTERM.

use super::config::AppConfig;
use super::loader::load_config;
use super::validation::validate_config;
use crate::api::{api_router, AppState};
use crate::middleware::BotGuard;
use anyhow::{Context, Result};
use atelier_core::{ChatOrchestrator, CredentialGate, OrchestratorConfig};
use atelier_imaging::{
    ClientFactory, FalClientFactory, SimulatedClientFactory, SimulatedImagingClient,
};
use atelier_llm::{LlmProvider, OpenAiConfig, OpenAiProvider};
use atelier_tools::{register_builtins, BuiltinsConfig, ToolRegistry};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Secrets read from the environment only
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub fal_key: Option<String>,
}

impl Secrets {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `FAL_KEY`
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            openai_api_key: read("OPENAI_API_KEY"),
            openai_base_url: read("OPENAI_BASE_URL"),
            fal_key: read("FAL_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_deref().map(atelier_llm::util::mask_api_key);
        f.debug_struct("Secrets")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("fal_key", &mask(&self.fal_key))
            .finish()
    }
}

/// Chat model from config and secrets
pub fn resolve_llm_provider(config: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn LlmProvider>> {
    let api_key = secrets
        .openai_api_key
        .clone()
        .context("OPENAI_API_KEY is not set")?;

    let mut openai = OpenAiConfig::new(api_key)
        .with_model(&config.llm.model)
        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
    if let Some(base_url) = config.llm.base_url.as_ref().or(secrets.openai_base_url.as_ref()) {
        openai = openai.with_base_url(base_url);
    }

    Ok(Arc::new(OpenAiProvider::new(openai)))
}

/// Image provider clients: simulated in test mode, fal.ai otherwise
pub fn resolve_client_factory(config: &AppConfig, secrets: &Secrets) -> Arc<dyn ClientFactory> {
    if config.test_mode.enabled {
        warn!(
            delay_ms = config.test_mode.delay_ms,
            "Test mode enabled: image generation is simulated"
        );
        return Arc::new(SimulatedClientFactory::new(SimulatedImagingClient::new(
            Duration::from_millis(config.test_mode.delay_ms),
            &config.test_mode.mock_image_url,
        )));
    }

    let template = config
        .imaging
        .fal_config(secrets.fal_key.as_deref().unwrap_or_default());
    Arc::new(FalClientFactory::new(template))
}

/// Build the application router
///
/// Must run inside a Tokio runtime (the memory limiter spawns its cleanup).
pub fn build_app(
    config: &AppConfig,
    provider: Arc<dyn LlmProvider>,
    factory: Arc<dyn ClientFactory>,
    shared_key: &str,
) -> Result<Router> {
    let mut registry = ToolRegistry::new();
    register_builtins(
        &mut registry,
        &BuiltinsConfig {
            imaging: config.imaging.settings(),
            vision_provider: provider.clone(),
            vision_model: config.llm.model.clone(),
        },
    );
    info!(tools = ?registry.list_names(), "Tools registered");

    let mut orchestrator_config = OrchestratorConfig::new()
        .with_model(&config.llm.model)
        .with_max_steps(config.llm.max_steps);
    if let Some(temperature) = config.llm.temperature {
        orchestrator_config = orchestrator_config.with_temperature(temperature);
    }
    let orchestrator = ChatOrchestrator::new(provider, Arc::new(registry), orchestrator_config);

    let limiter = config.rate_limit.build_limiter()?;
    let gate = Arc::new(CredentialGate::new(factory, shared_key, limiter));

    let bot_guard =
        Arc::new(BotGuard::new(&config.bot_protection).context("Failed to build bot guard")?);

    let state = AppState {
        gate,
        orchestrator,
        test_mode: config.test_mode.enabled,
    };

    Ok(api_router(state, bot_guard)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting Atelier v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;
    let secrets = Secrets::from_env();
    validate_config(&config, secrets.fal_key.as_deref())?;

    let provider = resolve_llm_provider(&config, &secrets)?;
    info!(provider = provider.name(), model = %config.llm.model, "LLM provider ready");

    let factory = resolve_client_factory(&config, &secrets);
    let shared_key = secrets.fal_key.clone().unwrap_or_default();
    let app = build_app(&config, provider, factory, &shared_key)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Atelier shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
