//! LLM completion service for the recipe pipeline (OpenAI/Anthropic/Groq).
//!
//! Every call is a single non-streaming completion. The pipeline talks to the
//! [`LlmClient`] trait; [`HttpLlmClient`] is the production implementation.

pub mod client;
pub mod config;
pub mod parse;
pub mod providers;
pub mod types;

pub use client::LlmClient;
pub use config::{
    LLMConfig, LLMConfigResponse, LLMConfigUpdate, ProviderPreference, ProviderUpdate,
    ResolvedProvider,
};
pub use providers::HttpLlmClient;
pub use types::*;
