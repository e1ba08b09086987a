//! Deterministic collaborators for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use mise_core::{Nutrition, RecipeData};
use mise_llm::{LlmClient, LlmRequest, LlmTask};
use mise_store::{ChatMessage, Role};
use parking_lot::Mutex;

use crate::error::ScrapeError;
use crate::scrape::{FetchedPage, PageFetcher};

/// LLM double answering from per-task queues and recording every request.
/// An empty queue answers with an inference error.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<HashMap<LlmTask, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
    knowledge_only: bool,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, task: LlmTask, text: impl Into<String>) -> Self {
        self.responses
            .lock()
            .entry(task)
            .or_default()
            .push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, task: LlmTask, message: impl Into<String>) -> Self {
        self.responses
            .lock()
            .entry(task)
            .or_default()
            .push_back(Err(message.into()));
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report no web search capability, like a chat-completions provider.
    pub fn without_web_search(mut self) -> Self {
        self.knowledge_only = true;
        self
    }

    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, task: LlmTask) -> usize {
        self.calls.lock().iter().filter(|c| c.task == task).count()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> mise_core::Result<String> {
        let task = request.task;
        self.calls.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .get_mut(&task)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(mise_core::Error::Inference(message)),
            None => Err(mise_core::Error::Inference(format!(
                "no scripted response for {}",
                task
            ))),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn supports_web_search(&self) -> bool {
        !self.knowledge_only
    }
}

/// Fetcher double serving fixed results by URL. Unknown URLs are a 404.
#[derive(Default)]
pub struct MapFetcher {
    pages: HashMap<String, Result<FetchedPage, ScrapeError>>,
    fetched: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, result: Result<FetchedPage, ScrapeError>) -> Self {
        self.pages.insert(url.to_string(), result);
        self
    }

    /// URLs fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ScrapeError> {
        self.fetched.lock().push(url.to_string());
        self.pages.get(url).cloned().unwrap_or(Ok(FetchedPage {
            status: 404,
            html: String::new(),
        }))
    }
}

/// A 200 response with `html`.
pub fn page(html: &str) -> Result<FetchedPage, ScrapeError> {
    Ok(FetchedPage {
        status: 200,
        html: html.to_string(),
    })
}

/// A 200 response whose body text is `chars` characters long.
pub fn page_with_text(chars: usize) -> Result<FetchedPage, ScrapeError> {
    let text: String = "Stir the pot and taste. "
        .chars()
        .cycle()
        .take(chars)
        .collect();
    page(&format!("<html><body><p>{}</p></body></html>", text))
}

pub fn message(index: i64, role: Role, content: &str) -> ChatMessage {
    ChatMessage {
        conversation_id: "conv".into(),
        index,
        role,
        content: content.into(),
        timestamp: 0,
    }
}

pub fn sample_recipe(title: &str, source_url: &str, ingredients: &[&str]) -> RecipeData {
    RecipeData {
        title: title.into(),
        description: None,
        portions: 4,
        ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
        instructions: vec!["Prep everything.".into(), "Cook and serve.".into()],
        nutrition: Some(Nutrition {
            calories_per_portion: 400.0,
            protein: 30.0,
            carbs: 20.0,
            fat: 15.0,
            ai_estimated: true,
        }),
        source_url: source_url.into(),
        image_url: None,
        substitutions: None,
    }
}

/// Formatter output for a recipe with the given ingredients.
pub fn format_output(title: &str, ingredients: &[&str]) -> String {
    serde_json::json!({
        "title": title,
        "portions": 4,
        "ingredients": ingredients,
        "instructions": ["Prep everything.", "Cook and serve."],
        "nutrition": {"calories_per_portion": 400, "protein": 30, "carbs": 20, "fat": 15, "ai_estimated": true}
    })
    .to_string()
}
