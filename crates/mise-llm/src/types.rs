//! Provider and request types.

use serde::{Deserialize, Serialize};

/// LLM provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Anthropic,
    Groq,
}

impl LLMProvider {
    pub const ALL: [LLMProvider; 3] = [LLMProvider::Anthropic, LLMProvider::OpenAI, LLMProvider::Groq];

    pub fn as_str(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "openai",
            LLMProvider::Anthropic => "anthropic",
            LLMProvider::Groq => "groq",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    /// Whether the provider runs a server-side web search tool.
    pub fn supports_web_search(&self) -> bool {
        matches!(self, LLMProvider::Anthropic)
    }

    /// Environment variable holding a fallback API key.
    pub fn env_key(&self) -> &'static str {
        match self {
            LLMProvider::OpenAI => "OPENAI_API_KEY",
            LLMProvider::Anthropic => "ANTHROPIC_API_KEY",
            LLMProvider::Groq => "GROQ_API_KEY",
        }
    }
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipeline stage issued a completion. Used for logging and by test
/// doubles to route scripted responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    ClassifyIntent,
    SearchCandidates,
    FormatRecipe,
    SubstituteIngredients,
}

impl std::fmt::Display for LlmTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LlmTask::ClassifyIntent => "classify_intent",
            LlmTask::SearchCandidates => "search_candidates",
            LlmTask::FormatRecipe => "format_recipe",
            LlmTask::SubstituteIngredients => "substitute_ingredients",
        };
        f.write_str(name)
    }
}

/// Settings for web-search-augmented completions.
#[derive(Debug, Clone, Default)]
pub struct WebSearch {
    /// Domains the search tool must not return results from.
    pub blocked_domains: Vec<String>,
    pub max_uses: u32,
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub task: LlmTask,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f64,
    pub web_search: Option<WebSearch>,
}

impl LlmRequest {
    pub fn new(task: LlmTask, prompt: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            task,
            system: None,
            prompt: prompt.into(),
            max_tokens,
            temperature: 0.2,
            web_search: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_web_search(mut self, web_search: WebSearch) -> Self {
        self.web_search = Some(web_search);
        self
    }
}
