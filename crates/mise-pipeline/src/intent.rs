//! Intent Extractor: classify what a chat transcript wants to cook.

use std::sync::Arc;

use mise_core::DietaryProfile;
use mise_llm::{parse, LlmClient, LlmRequest, LlmTask};
use mise_store::ChatMessage;
use serde::Deserialize;
use tracing::debug;

use crate::error::IntentError;
use crate::types::{Intent, IntentStatus};

const SYSTEM_PROMPT: &str = "You classify cooking conversations. Read the transcript and decide \
what the user wants to cook. Respond with a single JSON object and nothing else:
{\"dish\": string, \"searchQuery\": string, \"status\": string, \"explanation\": string}

status is one of:
- off_topic: the conversation is not about food or cooking
- kitchen_utility: a kitchen question (technique, equipment, storage) rather than a dish
- broad_category: a wide category such as \"something with chicken\"
- dish_type: a kind of dish such as \"a curry\" or \"a soup\"
- specific_dish: a named dish such as \"pad thai\"
- fully_refined: a named dish plus details such as style, spice level or key ingredients

dish is the best dish name so far. searchQuery is a short web search query that would find a \
recipe for it. explanation is one sentence addressed to the user.";

/// Model output before the certainty mapping. Any certainty the model adds is
/// ignored as an unknown field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntent {
    dish: String,
    search_query: String,
    status: IntentStatus,
    explanation: String,
}

pub struct IntentExtractor {
    llm: Arc<dyn LlmClient>,
    max_tokens: usize,
}

impl IntentExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: usize) -> Self {
        Self { llm, max_tokens }
    }

    /// Classify `messages` (ordered by index). The profile only colors the
    /// explanation. No retry: a malformed response is an `IntentError::Parse`.
    pub async fn extract(
        &self,
        messages: &[ChatMessage],
        profile: &DietaryProfile,
    ) -> Result<Intent, IntentError> {
        if messages.is_empty() {
            return Err(IntentError::Parse("empty transcript".into()));
        }

        let request = LlmRequest::new(
            LlmTask::ClassifyIntent,
            build_prompt(messages, profile),
            self.max_tokens,
        )
        .with_system(SYSTEM_PROMPT);

        let output = self
            .llm
            .complete(request)
            .await
            .map_err(|e| IntentError::Llm(e.to_string()))?;
        let intent = interpret(&output)?;
        debug!(
            "Intent: {:?} '{}' (query '{}')",
            intent.status, intent.dish, intent.search_query
        );
        Ok(intent)
    }
}

fn build_prompt(messages: &[ChatMessage], profile: &DietaryProfile) -> String {
    let transcript: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content.trim()))
        .collect();
    format!(
        "Dietary profile:\n{}\n\nTranscript:\n{}",
        profile.prompt_summary(),
        transcript.join("\n")
    )
}

/// Strictly decode model output and apply the status → certainty mapping.
fn interpret(output: &str) -> Result<Intent, IntentError> {
    let raw: RawIntent = parse::decode(output).map_err(IntentError::Parse)?;

    let dish = raw.dish.trim().to_string();
    let mut search_query = raw.search_query.trim().to_string();
    if raw.status != IntentStatus::OffTopic && search_query.is_empty() {
        if dish.is_empty() {
            return Err(IntentError::Parse(
                "intent has neither dish nor searchQuery".into(),
            ));
        }
        search_query = dish.clone();
    }

    Ok(Intent {
        dish,
        search_query,
        status: raw.status,
        certainty: raw.status.certainty(),
        explanation: raw.explanation.trim().to_string(),
    })
}
