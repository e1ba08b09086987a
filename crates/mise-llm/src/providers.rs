//! External LLM provider implementations.
//!
//! OpenAI and Groq share the chat-completions format. Anthropic uses the
//! Messages API and is the only provider wired to a server-side web search
//! tool. Clients report that through [`LlmClient::supports_web_search`] so
//! callers never send a search request to a provider that would ignore it.

use async_trait::async_trait;
use mise_core::{Error, Result};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::LlmClient;
use crate::config::ResolvedProvider;
use crate::types::{LLMProvider, LlmRequest};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";

/// HTTP client for one resolved provider. The model is picked per request
/// from the task overrides.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    resolved: ResolvedProvider,
}

impl HttpLlmClient {
    pub fn new(client: Client, resolved: ResolvedProvider) -> Self {
        Self { client, resolved }
    }

    pub fn provider(&self) -> LLMProvider {
        self.resolved.provider
    }

    async fn complete_openai_compat(&self, url: &str, request: &LlmRequest) -> Result<String> {
        let body = openai_body(request, self.resolved.model_for(request.task));

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.resolved.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        let parsed = read_json(response).await?;
        extract_openai_text(&parsed)
    }

    async fn complete_anthropic(&self, request: &LlmRequest) -> Result<String> {
        let body = anthropic_body(request, self.resolved.model_for(request.task));

        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.resolved.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

        let parsed = read_json(response).await?;
        extract_anthropic_text(&parsed)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<String> {
        debug!(
            "Completing {} with {} model {} (max_tokens={})",
            request.task,
            self.resolved.provider,
            self.resolved.model_for(request.task),
            request.max_tokens
        );
        match self.resolved.provider {
            LLMProvider::OpenAI => self.complete_openai_compat(OPENAI_URL, &request).await,
            LLMProvider::Groq => self.complete_openai_compat(GROQ_URL, &request).await,
            LLMProvider::Anthropic => self.complete_anthropic(&request).await,
        }
    }

    fn model(&self) -> &str {
        &self.resolved.model
    }

    fn supports_web_search(&self) -> bool {
        self.resolved.supports_web_search()
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Inference(format!("API error {}: {}", status, body)));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| Error::Inference(format!("Invalid response body: {}", e)))
}

/// Chat-completions request body (OpenAI, Groq).
pub fn openai_body(request: &LlmRequest, model: &str) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));

    json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    })
}

/// Messages API request body, with the web search tool when requested.
pub fn anthropic_body(request: &LlmRequest, model: &str) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [{"role": "user", "content": request.prompt}],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });

    if let Some(sys) = &request.system {
        body["system"] = json!(sys);
    }

    if let Some(search) = &request.web_search {
        let mut tool = json!({
            "type": "web_search_20250305",
            "name": "web_search",
            "max_uses": search.max_uses.max(1),
        });
        if !search.blocked_domains.is_empty() {
            tool["blocked_domains"] = json!(search.blocked_domains);
        }
        body["tools"] = json!([tool]);
    }

    body
}

pub fn extract_openai_text(response: &Value) -> Result<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Inference("Response has no message content".into()))
}

/// Concatenate the text blocks of a Messages API response. Tool use and tool
/// result blocks from web search are skipped.
pub fn extract_anthropic_text(response: &Value) -> Result<String> {
    if response["type"].as_str() == Some("error") {
        let msg = response["error"]["message"]
            .as_str()
            .unwrap_or("Unknown error");
        return Err(Error::Inference(msg.to_string()));
    }

    let blocks = response["content"]
        .as_array()
        .ok_or_else(|| Error::Inference("Response has no content blocks".into()))?;

    let text: String = blocks
        .iter()
        .filter(|b| b["type"].as_str() == Some("text"))
        .filter_map(|b| b["text"].as_str())
        .collect();

    if text.trim().is_empty() {
        return Err(Error::Inference("Response contained no text".into()));
    }
    Ok(text)
}
