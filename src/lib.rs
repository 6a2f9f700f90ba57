pub mod api;
pub mod config;
pub mod errors;
pub mod executor;
pub mod lifecycle;
pub mod llm;
pub mod perception;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::api::AppState;
use crate::config::AppConfig;
use crate::errors::AgentResult;
use crate::executor::{ActionExecutor, EnigoDevice};
use crate::lifecycle::Lifecycle;
use crate::llm::registry::ProviderRegistry;
use crate::perception::ScreenAnalyzer;

/// Boots the service: tracing, `.env`, config, store, executor, model
/// providers, then the HTTP API until it stops.
pub async fn run() -> AgentResult<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let (cfg, config_error) = match config::load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    match config_error {
        Some(e) => tracing::warn!(error = %e, "failed to load config; using defaults"),
        None => tracing::info!(
            provider = %cfg.llm.active_provider,
            store = ?cfg.store.backend,
            "config loaded"
        ),
    }

    let store = store::open(&cfg.store)?;
    let executor = Arc::new(ActionExecutor::new(Arc::new(EnigoDevice::new()), cfg.executor.clone()));
    let registry = ProviderRegistry::from_config(&cfg);
    tracing::info!(providers = ?registry.list_names(), "model providers registered");
    let analyzer = ScreenAnalyzer::from_registry(&registry)?;

    let state = AppState {
        lifecycle: Arc::new(Lifecycle::new(store, executor, &cfg.lifecycle)),
        analyzer: Arc::new(analyzer),
    };
    api::serve(state, &cfg.server).await
}
