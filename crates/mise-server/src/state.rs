//! Shared application state.

use std::sync::Arc;

use mise_core::MiseConfig;
use mise_llm::{HttpLlmClient, LLMConfig, LlmClient};
use mise_pipeline::{Orchestrator, PageFetcher, PipelineError, PipelineSettings, Stores};
use mise_store::SqliteStore;
use parking_lot::RwLock;
use tracing::{info, warn};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: MiseConfig,
    pub store: Arc<SqliteStore>,
    pub llm_config: RwLock<LLMConfig>,
    pub settings: PipelineSettings,
    fetcher: Arc<dyn PageFetcher>,
    llm: RwLock<Option<Arc<dyn LlmClient>>>,
    http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: MiseConfig,
        store: SqliteStore,
        fetcher: Arc<dyn PageFetcher>,
        settings: PipelineSettings,
    ) -> Self {
        let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);
        let http = reqwest::Client::new();
        let llm = build_llm(&http, &llm_config);
        if llm.is_none() {
            warn!("No LLM provider configured; recipe generation is unavailable");
        }
        Self {
            config,
            store: Arc::new(store),
            llm_config: RwLock::new(llm_config),
            settings,
            fetcher,
            llm: RwLock::new(llm),
            http,
        }
    }

    /// The active completion client, if a provider is configured.
    pub fn llm(&self) -> Option<Arc<dyn LlmClient>> {
        self.llm.read().clone()
    }

    pub fn set_llm(&self, llm: Option<Arc<dyn LlmClient>>) {
        *self.llm.write() = llm;
    }

    /// Rebuild the completion client from the current LLM config.
    pub fn refresh_llm(&self) {
        let llm = build_llm(&self.http, &self.llm_config.read());
        self.set_llm(llm);
    }

    /// A pipeline run bound to the current client. Unavailable when no
    /// provider is configured.
    pub fn orchestrator(&self) -> Result<Orchestrator, PipelineError> {
        let llm = self.llm().ok_or_else(|| {
            PipelineError::Unavailable("No LLM provider configured".into())
        })?;
        Ok(Orchestrator::new(
            Stores::from_shared(self.store.clone()),
            llm,
            self.fetcher.clone(),
            self.settings.clone(),
        ))
    }
}

fn build_llm(http: &reqwest::Client, config: &LLMConfig) -> Option<Arc<dyn LlmClient>> {
    let resolved = config.resolve()?;
    info!(
        "LLM provider: {} ({}), web search {}",
        resolved.provider,
        resolved.model,
        if resolved.supports_web_search() { "on" } else { "off" }
    );
    Some(Arc::new(HttpLlmClient::new(http.clone(), resolved)))
}

#[cfg(test)]
impl AppState {
    /// State over a fresh data directory with injected collaborators.
    pub fn for_tests(
        data_dir: &std::path::Path,
        llm: Option<Arc<dyn LlmClient>>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let config = MiseConfig::from_env(data_dir).unwrap();
        let store = SqliteStore::open(&config.data_paths.db).unwrap();
        let state = Self::new(config, store, fetcher, PipelineSettings::default());
        state.set_llm(llm);
        state
    }
}
