//! Runtime for the three cooperating processes (§2, §5): ingress, dispatcher,
//! executor. Each binary in `src/bin/` wires these modules to a shared
//! `cadre_core::store::Store` and runs a single cooperative loop — no
//! task-level parallelism inside a process.

pub mod dispatcher;
pub mod executor;
pub mod health;
pub mod providers;
pub mod scheduler;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] cadre_core::CoreError),
    #[error(transparent)]
    Agents(#[from] cadre_agents::AgentsError),
    #[error(transparent)]
    Mission(#[from] cadre_agents::mission::MissionError),
    #[error(transparent)]
    Registry(#[from] cadre_agents::registry::RegistryError),
    #[error(transparent)]
    Review(#[from] cadre_agents::review::ReviewError),
    #[error(transparent)]
    Intelligence(#[from] cadre_intelligence::IntelligenceError),
    #[error(transparent)]
    Llm(#[from] cadre_intelligence::llm::LlmError),
}

use std::sync::Arc;

use cadre_core::config::Config;
use cadre_core::store::Store;
use cadre_intelligence::llm::{HttpChatProvider, LlmProvider};
use cadre_intelligence::model_router::{ModelRouter, TierModels};
use cadre_intelligence::tool_resolver::ToolResolver;

use health::HealthState;
use providers::{HttpFetchProvider, NullSearchProvider, NullSocialPoster};

/// Common startup for all three binaries: load config, init logging, open
/// the shared store, and seed the standing teams so routing never targets a
/// nonexistent team on a fresh install.
pub async fn bootstrap(process: &str) -> Result<(Config, Arc<Store>, Arc<HealthState>), DaemonError> {
    let cfg = Config::load().unwrap_or_default();
    cadre_core::logging::init_logging(process, &cfg.general.log_level);
    let store = Arc::new(Store::new(&cfg.store.path).await?);
    dispatcher::ensure_standing_teams(&store).await?;
    let health = Arc::new(HealthState::new(process));
    Ok((cfg, store, health))
}

/// Builds the shared model router from config: an OpenAI-compatible HTTP
/// provider pointed at `providers.api_base`, authenticated with the API key
/// read from `providers.api_key_env`.
pub fn build_router(cfg: &Config, store: Arc<Store>) -> ModelRouter {
    let api_key = cfg
        .providers
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .unwrap_or_default();
    let base_url = cfg
        .providers
        .api_base
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    let provider: Arc<dyn LlmProvider> = Arc::new(HttpChatProvider::new(base_url, api_key));
    let models = TierModels {
        t1: cfg.providers.t1_model.clone(),
        t2: cfg.providers.t2_model.clone(),
        t3: cfg.providers.t3_model.clone(),
    };
    ModelRouter::new(provider, models, store)
        .with_t1_retry(std::time::Duration::from_secs(cfg.model_routing.t1_retry_secs))
}

pub fn build_tool_resolver() -> ToolResolver {
    ToolResolver::new(
        Arc::new(NullSearchProvider),
        Arc::new(HttpFetchProvider::new()),
        Arc::new(NullSocialPoster),
    )
}
