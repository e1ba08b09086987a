//! Recipe Formatter: structure scraped page text into [`RecipeData`].

use std::sync::Arc;

use mise_core::{DietaryProfile, Nutrition, RecipeData};
use mise_llm::{parse, LlmClient, LlmRequest, LlmTask};
use serde::Deserialize;
use tracing::debug;

use crate::error::FormatError;
use crate::types::ScrapedContent;

const SYSTEM_PROMPT: &str = "You turn recipe web page text into structured data. Respond with a \
single JSON object and nothing else:
{\"title\": string, \"description\": string, \"portions\": integer,
 \"ingredients\": [string], \"instructions\": [string],
 \"nutrition\": {\"calories_per_portion\": number, \"protein\": number, \"carbs\": number,
                \"fat\": number, \"ai_estimated\": boolean},
 \"imageUrl\": string or null}

Each ingredient is one line with quantity and unit. Each instruction is one step. Protein, carbs \
and fat are grams per portion. If the page gives no nutrition facts, estimate them and set \
ai_estimated to true. Ignore comments, ads and unrelated stories.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecipe {
    title: String,
    #[serde(default)]
    description: Option<String>,
    portions: u32,
    ingredients: Vec<String>,
    instructions: Vec<String>,
    #[serde(default)]
    nutrition: Option<Nutrition>,
    #[serde(default)]
    image_url: Option<String>,
}

pub struct RecipeFormatter {
    llm: Arc<dyn LlmClient>,
    max_tokens: usize,
    max_input_chars: usize,
}

impl RecipeFormatter {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: usize, max_input_chars: usize) -> Self {
        Self {
            llm,
            max_tokens,
            max_input_chars,
        }
    }

    /// Structure `scraped` into a recipe whose `source_url` is `source_url`.
    pub async fn format(
        &self,
        scraped: &ScrapedContent,
        source_url: &str,
        profile: &DietaryProfile,
    ) -> Result<RecipeData, FormatError> {
        let text = truncate_chars(&scraped.text, self.max_input_chars);
        let prompt = format!(
            "Source URL: {}\n\nDietary profile (for context only, do not change the recipe):\n{}\n\nPage text:\n{}",
            source_url,
            profile.prompt_summary(),
            text
        );
        let request =
            LlmRequest::new(LlmTask::FormatRecipe, prompt, self.max_tokens).with_system(SYSTEM_PROMPT);

        let output = self
            .llm
            .complete(request)
            .await
            .map_err(|e| FormatError::Llm(e.to_string()))?;
        let recipe = interpret(&output, scraped, source_url)?;
        debug!(
            "Formatted '{}' from {}: {} ingredients, {} steps",
            recipe.title,
            source_url,
            recipe.ingredients.len(),
            recipe.instructions.len()
        );
        Ok(recipe)
    }
}

fn interpret(
    output: &str,
    scraped: &ScrapedContent,
    source_url: &str,
) -> Result<RecipeData, FormatError> {
    let raw: RawRecipe = parse::decode(output).map_err(FormatError::Parse)?;

    let title = raw.title.trim().to_string();
    if title.is_empty() {
        return Err(FormatError::Invalid("empty title".into()));
    }
    if raw.portions == 0 {
        return Err(FormatError::Invalid("portions must be at least 1".into()));
    }
    let ingredients = non_blank(raw.ingredients);
    if ingredients.is_empty() {
        return Err(FormatError::Invalid("no ingredients".into()));
    }
    let instructions = non_blank(raw.instructions);
    if instructions.is_empty() {
        return Err(FormatError::Invalid("no instructions".into()));
    }

    let nutrition = match raw.nutrition {
        Some(mut n) => {
            let values = [n.calories_per_portion, n.protein, n.carbs, n.fat];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(FormatError::Invalid("negative or non-finite nutrition".into()));
            }
            if !has_nutrition_markers(&scraped.text) {
                n.ai_estimated = true;
            }
            Some(n)
        }
        None if has_nutrition_markers(&scraped.text) => None,
        None => return Err(FormatError::Invalid("missing nutrition estimate".into())),
    };

    let image_url = raw
        .image_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .or_else(|| scraped.image_url.clone());

    Ok(RecipeData {
        title,
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        portions: raw.portions,
        ingredients,
        instructions,
        nutrition,
        source_url: source_url.to_string(),
        image_url,
        substitutions: None,
    })
}

/// True when the source text states nutrition itself.
pub fn has_nutrition_markers(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("calorie") || lower.contains("kcal")
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
