//! Provider configuration: which provider answers, with which model per
//! pipeline task, and whether it can search the web.
//!
//! Persisted to `llm-config.json`:
//!
//! ```json
//! {"preferredProvider": "auto",
//!  "providers": {"anthropic": {"apiKey": "…", "model": "…",
//!                              "taskModels": {"format_recipe": "…"}}}}
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::{LLMProvider, LlmTask};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";

/// `auto` tries providers in [`LLMProvider::ALL`] order, web search capable
/// first. A fixed choice never falls back to another provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderPreference {
    #[default]
    Auto,
    Only(LLMProvider),
}

impl ProviderPreference {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            other => LLMProvider::parse(other).map(Self::Only),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Only(p) => p.as_str(),
        }
    }

    fn candidates(&self) -> Vec<LLMProvider> {
        match self {
            Self::Auto => LLMProvider::ALL.to_vec(),
            Self::Only(p) => vec![*p],
        }
    }
}

impl TryFrom<String> for ProviderPreference {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

impl From<ProviderPreference> for String {
    fn from(p: ProviderPreference) -> Self {
        p.as_str().to_string()
    }
}

/// Key, default model and per-task model overrides for one provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub task_models: HashMap<LlmTask, String>,
}

impl ProviderSettings {
    fn with_model(model: &str) -> Self {
        Self {
            api_key: None,
            model: model.to_string(),
            task_models: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("task_models", &self.task_models)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Providers {
    #[serde(default = "default_openai")]
    pub openai: ProviderSettings,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderSettings,
    #[serde(default = "default_groq")]
    pub groq: ProviderSettings,
}

fn default_openai() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_OPENAI_MODEL)
}
fn default_anthropic() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_ANTHROPIC_MODEL)
}
fn default_groq() -> ProviderSettings {
    ProviderSettings::with_model(DEFAULT_GROQ_MODEL)
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            anthropic: default_anthropic(),
            groq: default_groq(),
        }
    }
}

impl Providers {
    pub fn get(&self, provider: LLMProvider) -> &ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &self.openai,
            LLMProvider::Anthropic => &self.anthropic,
            LLMProvider::Groq => &self.groq,
        }
    }

    fn get_mut(&mut self, provider: LLMProvider) -> &mut ProviderSettings {
        match provider {
            LLMProvider::OpenAI => &mut self.openai,
            LLMProvider::Anthropic => &mut self.anthropic,
            LLMProvider::Groq => &mut self.groq,
        }
    }
}

/// The provider chosen to serve completions.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider: LLMProvider,
    pub api_key: String,
    pub model: String,
    pub task_models: HashMap<LlmTask, String>,
}

impl ResolvedProvider {
    /// Model for `task`: the task override, else the provider default.
    pub fn model_for(&self, task: LlmTask) -> &str {
        self.task_models
            .get(&task)
            .map(String::as_str)
            .unwrap_or(&self.model)
    }

    pub fn supports_web_search(&self) -> bool {
        self.provider.supports_web_search()
    }
}

/// Stored LLM configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfig {
    #[serde(default)]
    pub preferred_provider: ProviderPreference,
    #[serde(default)]
    pub providers: Providers,
    #[serde(skip)]
    pub config_path: PathBuf,
}

/// Partial update from `PUT /api/llm/config`. An empty `apiKey` clears the
/// stored key; `taskModels` replaces the provider's overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigUpdate {
    #[serde(default)]
    pub preferred_provider: Option<String>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub task_models: Option<HashMap<LlmTask, String>>,
}

/// Public view of the config. Keys are reported as configured or not, never
/// returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMConfigResponse {
    pub preferred_provider: &'static str,
    pub active_provider: Option<LLMProvider>,
    pub active_model: Option<String>,
    /// Whether candidate search runs a live web search.
    pub web_search: bool,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: LLMProvider,
    pub configured: bool,
    pub model: String,
    pub task_models: HashMap<LlmTask, String>,
}

impl LLMConfig {
    /// Load from file, then fill missing keys from the environment.
    pub fn load(config_path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(config_path) {
            Ok(text) => serde_json::from_str::<LLMConfig>(&text).unwrap_or_else(|e| {
                warn!(
                    "Ignoring unreadable LLM config {}: {}",
                    config_path.display(),
                    e
                );
                LLMConfig::default()
            }),
            Err(_) => LLMConfig::default(),
        };
        config.config_path = config_path.to_path_buf();

        for provider in LLMProvider::ALL {
            let settings = config.providers.get_mut(provider);
            if settings.api_key.is_none() {
                settings.api_key = std::env::var(provider.env_key())
                    .ok()
                    .filter(|k| !k.trim().is_empty());
            }
        }
        config
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved LLM config to {}", self.config_path.display());
        Ok(())
    }

    /// Validate the whole update, then merge it. Nothing changes on error.
    pub fn apply_update(&mut self, update: &LLMConfigUpdate) -> Result<(), String> {
        let preference = match &update.preferred_provider {
            Some(p) => Some(ProviderPreference::parse(p).ok_or_else(|| {
                format!("preferredProvider must be one of auto, openai, anthropic, groq; got '{}'", p)
            })?),
            None => None,
        };
        let mut changes = Vec::with_capacity(update.providers.len());
        for (name, change) in &update.providers {
            let provider =
                LLMProvider::parse(name).ok_or_else(|| format!("unknown provider '{}'", name))?;
            if change.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
                return Err(format!("model for {} must not be empty", provider));
            }
            changes.push((provider, change));
        }

        if let Some(preference) = preference {
            self.preferred_provider = preference;
        }
        for (provider, change) in changes {
            let settings = self.providers.get_mut(provider);
            if let Some(key) = &change.api_key {
                let key = key.trim();
                settings.api_key = (!key.is_empty()).then(|| key.to_string());
            }
            if let Some(model) = &change.model {
                settings.model = model.trim().to_string();
            }
            if let Some(task_models) = &change.task_models {
                settings.task_models = task_models.clone();
            }
        }
        Ok(())
    }

    /// The first candidate provider that has a key.
    pub fn resolve(&self) -> Option<ResolvedProvider> {
        self.preferred_provider
            .candidates()
            .into_iter()
            .find_map(|provider| {
                let settings = self.providers.get(provider);
                settings.api_key.as_ref().map(|key| ResolvedProvider {
                    provider,
                    api_key: key.clone(),
                    model: settings.model.clone(),
                    task_models: settings.task_models.clone(),
                })
            })
    }

    pub fn to_response(&self) -> LLMConfigResponse {
        let resolved = self.resolve();
        LLMConfigResponse {
            preferred_provider: self.preferred_provider.as_str(),
            active_provider: resolved.as_ref().map(|r| r.provider),
            active_model: resolved.as_ref().map(|r| r.model.clone()),
            web_search: resolved.as_ref().is_some_and(|r| r.supports_web_search()),
            providers: LLMProvider::ALL
                .into_iter()
                .map(|provider| {
                    let settings = self.providers.get(provider);
                    ProviderStatus {
                        provider,
                        configured: settings.api_key.is_some(),
                        model: settings.model.clone(),
                        task_models: settings.task_models.clone(),
                    }
                })
                .collect(),
        }
    }
}
