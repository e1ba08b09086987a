//! Substitution Engine: replace disallowed ingredients and record what changed.

use std::sync::Arc;

use mise_core::{DietaryProfile, RecipeData, Substitution};
use mise_llm::{parse, LlmClient, LlmRequest, LlmTask};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::UnresolvedPolicy;
use crate::constraints;
use crate::error::SubstitutionError;
use crate::types::DisallowedMatch;

const SYSTEM_PROMPT: &str = "You adapt recipes to dietary constraints. Replace every flagged \
ingredient with a safe alternative that keeps the dish working, and rewrite the instructions to \
match. Keep the ingredient list in the same order and length where you can. Respond with a \
single JSON object and nothing else:
{\"ingredients\": [string], \"instructions\": [string],
 \"substitutions\": [{\"original\": string, \"substituted\": string, \"reason\": string,
                     \"originalIngredient\": string, \"substitutedIngredient\": string}]}

ingredients and instructions are the complete new lists, not just the changed lines. Add one \
substitutions entry per replaced ingredient: original and substituted are the plain item names, \
originalIngredient and substitutedIngredient are the full lines.";

#[derive(Debug, Deserialize)]
struct RawSubstitution {
    ingredients: Vec<String>,
    instructions: Vec<String>,
    substitutions: Vec<Substitution>,
}

pub struct SubstitutionEngine {
    llm: Arc<dyn LlmClient>,
    max_tokens: usize,
    policy: UnresolvedPolicy,
}

impl SubstitutionEngine {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: usize, policy: UnresolvedPolicy) -> Self {
        Self {
            llm,
            max_tokens,
            policy,
        }
    }

    /// Rewrite `recipe` so none of `disallowed` remain. The result carries
    /// fully replaced ingredient and instruction lists plus an audit trail.
    pub async fn substitute(
        &self,
        recipe: RecipeData,
        disallowed: &[DisallowedMatch],
        profile: &DietaryProfile,
    ) -> Result<RecipeData, SubstitutionError> {
        let request = LlmRequest::new(
            LlmTask::SubstituteIngredients,
            build_prompt(&recipe, disallowed, profile),
            self.max_tokens,
        )
        .with_system(SYSTEM_PROMPT);

        let output = self
            .llm
            .complete(request)
            .await
            .map_err(|e| SubstitutionError::Llm(e.to_string()))?;
        let substituted = apply(recipe, &output)?;

        let remaining = constraints::check(&substituted.ingredients, profile);
        if !remaining.is_empty() {
            let names: Vec<String> = remaining.into_iter().map(|m| m.ingredient).collect();
            match self.policy {
                UnresolvedPolicy::Reject => return Err(SubstitutionError::Unresolved(names)),
                UnresolvedPolicy::Warn => warn!(
                    "Substitution for '{}' left disallowed ingredients: {}",
                    substituted.title,
                    names.join(", ")
                ),
            }
        }
        Ok(substituted)
    }
}

fn build_prompt(
    recipe: &RecipeData,
    disallowed: &[DisallowedMatch],
    profile: &DietaryProfile,
) -> String {
    let flagged: Vec<String> = disallowed
        .iter()
        .map(|m| format!("- {} ({})", m.ingredient, m.reason))
        .collect();
    let ingredients: Vec<String> = recipe.ingredients.iter().map(|i| format!("- {}", i)).collect();
    let steps: Vec<String> = recipe
        .instructions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect();
    format!(
        "Recipe: {}\n\nDietary profile:\n{}\n\nFlagged ingredients:\n{}\n\nIngredients:\n{}\n\nInstructions:\n{}",
        recipe.title,
        profile.prompt_summary(),
        flagged.join("\n"),
        ingredients.join("\n"),
        steps.join("\n")
    )
}

/// Strictly decode the model output and swap it into `recipe`.
fn apply(mut recipe: RecipeData, output: &str) -> Result<RecipeData, SubstitutionError> {
    let raw: RawSubstitution = parse::decode(output).map_err(SubstitutionError::Parse)?;

    let ingredients: Vec<String> = raw
        .ingredients
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let instructions: Vec<String> = raw
        .instructions
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if ingredients.is_empty() || instructions.is_empty() {
        return Err(SubstitutionError::Invalid(
            "ingredients and instructions must be non-empty".into(),
        ));
    }
    if raw.substitutions.is_empty() {
        return Err(SubstitutionError::Invalid("no substitutions recorded".into()));
    }
    if raw
        .substitutions
        .iter()
        .any(|s| s.original.trim().is_empty() || s.substituted.trim().is_empty())
    {
        return Err(SubstitutionError::Invalid("blank substitution entry".into()));
    }

    if ingredients.len() != recipe.ingredients.len() {
        warn!(
            "Substitution changed ingredient count of '{}' from {} to {}",
            recipe.title,
            recipe.ingredients.len(),
            ingredients.len()
        );
    }
    debug!(
        "Applied {} substitutions to '{}'",
        raw.substitutions.len(),
        recipe.title
    );

    recipe.ingredients = ingredients;
    recipe.instructions = instructions;
    recipe.substitutions = Some(raw.substitutions);
    Ok(recipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_recipe, ScriptedLlm};

    const SHRIMP_FIX: &str = r#"{"ingredients": ["2 lbs chicken thigh", "1 tbsp garlic"],
        "instructions": ["Sear the chicken.", "Add garlic."],
        "substitutions": [{"original": "shrimp", "substituted": "chicken thigh",
            "reason": "allergy: shellfish", "originalIngredient": "2 lbs shrimp",
            "substitutedIngredient": "2 lbs chicken thigh"}]}"#;

    fn shellfish_profile() -> DietaryProfile {
        DietaryProfile {
            allergens: vec!["shellfish".into()],
            ..Default::default()
        }
    }

    fn shrimp_recipe() -> RecipeData {
        sample_recipe(
            "Garlic Shrimp",
            "https://a.example/shrimp",
            &["2 lbs shrimp", "1 tbsp garlic"],
        )
    }

    #[tokio::test]
    async fn test_replaces_lists_and_records_audit() {
        let llm = Arc::new(ScriptedLlm::new().respond(LlmTask::SubstituteIngredients, SHRIMP_FIX));
        let engine = SubstitutionEngine::new(llm.clone(), 1000, UnresolvedPolicy::Warn);
        let profile = shellfish_profile();
        let recipe = shrimp_recipe();
        let flagged = constraints::check(&recipe.ingredients, &profile);

        let out = engine.substitute(recipe, &flagged, &profile).await.unwrap();
        assert!(out.ingredients.iter().all(|i| !i.contains("shrimp")));
        assert_eq!(out.instructions[0], "Sear the chicken.");
        let subs = out.substitutions.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].original, "shrimp");
        assert_eq!(out.source_url, "https://a.example/shrimp");

        let calls = llm.calls();
        let prompt = &calls[0].prompt;
        assert!(prompt.contains("- 2 lbs shrimp (allergy: shellfish)"));
    }

    #[tokio::test]
    async fn test_unresolved_policy() {
        let still_shrimp = r#"{"ingredients": ["2 lbs prawns", "1 tbsp garlic"],
            "instructions": ["Cook."],
            "substitutions": [{"original": "shrimp", "substituted": "prawns", "reason": "x",
                "originalIngredient": "2 lbs shrimp", "substitutedIngredient": "2 lbs prawns"}]}"#;
        let profile = shellfish_profile();

        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(LlmTask::SubstituteIngredients, still_shrimp)
                .respond(LlmTask::SubstituteIngredients, still_shrimp),
        );
        let reject = SubstitutionEngine::new(llm.clone(), 1000, UnresolvedPolicy::Reject);
        let err = reject.substitute(shrimp_recipe(), &[], &profile).await.unwrap_err();
        assert_eq!(err, SubstitutionError::Unresolved(vec!["2 lbs prawns".into()]));

        let warn_only = SubstitutionEngine::new(llm, 1000, UnresolvedPolicy::Warn);
        let out = warn_only.substitute(shrimp_recipe(), &[], &profile).await.unwrap();
        assert_eq!(out.ingredients[0], "2 lbs prawns");
    }

    #[test]
    fn test_structurally_invalid() {
        let recipe = shrimp_recipe();
        let no_subs = r#"{"ingredients": ["a"], "instructions": ["b"], "substitutions": []}"#;
        assert!(matches!(
            apply(recipe.clone(), no_subs),
            Err(SubstitutionError::Invalid(_))
        ));
        let missing = r#"{"ingredients": ["a"], "instructions": ["b"]}"#;
        assert!(matches!(
            apply(recipe, missing),
            Err(SubstitutionError::Parse(_))
        ));
    }
}
