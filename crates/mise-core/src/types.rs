//! Recipe and dietary profile types shared by the store and the pipeline.

use serde::{Deserialize, Serialize};

/// Per-portion nutrition values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories_per_portion: f64,
    /// Grams of protein per portion.
    pub protein: f64,
    /// Grams of carbohydrate per portion.
    pub carbs: f64,
    /// Grams of fat per portion.
    pub fat: f64,
    /// True when the values were estimated by the model rather than read from
    /// the source page.
    #[serde(default)]
    pub ai_estimated: bool,
}

/// One replacement recorded by the substitution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    /// Disallowed item that was replaced (e.g. `shrimp`).
    pub original: String,
    /// Replacement item (e.g. `chicken thigh`).
    pub substituted: String,
    pub reason: String,
    /// Full original ingredient line.
    pub original_ingredient: String,
    /// Full replacement ingredient line.
    pub substituted_ingredient: String,
}

/// Structured recipe content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub portions: u32,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<Nutrition>,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitutions: Option<Vec<Substitution>>,
}

/// Daily macro goals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTargets {
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub protein: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
    #[serde(default)]
    pub fat: Option<f64>,
}

/// A user's food preferences and hard constraints.
///
/// All string sets are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietaryProfile {
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default)]
    pub allergens: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooking_proficiency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_macro_targets: Option<MacroTargets>,
}

impl DietaryProfile {
    /// True when the profile carries no allergens or restrictions.
    pub fn has_constraints(&self) -> bool {
        self.allergens.iter().any(|a| !a.trim().is_empty())
            || self.restrictions.iter().any(|r| !r.trim().is_empty())
    }

    /// Short human-readable summary used inside model prompts.
    pub fn prompt_summary(&self) -> String {
        let mut lines = Vec::new();
        let sections = [
            ("Allergens (must never appear)", &self.allergens),
            ("Dietary restrictions (must be respected)", &self.restrictions),
            ("Likes", &self.likes),
            ("Dislikes", &self.dislikes),
        ];
        for (label, values) in sections {
            if !values.is_empty() {
                lines.push(format!("{}: {}", label, values.join(", ")));
            }
        }
        if let Some(level) = &self.cooking_proficiency {
            lines.push(format!("Cooking proficiency: {}", level));
        }
        if let Some(targets) = &self.daily_macro_targets {
            let parts: Vec<String> = [
                ("calories", targets.calories),
                ("protein g", targets.protein),
                ("carbs g", targets.carbs),
                ("fat g", targets.fat),
            ]
            .iter()
            .filter_map(|(name, v)| v.map(|v| format!("{} {}", v, name)))
            .collect();
            if !parts.is_empty() {
                lines.push(format!("Daily targets: {}", parts.join(", ")));
            }
        }
        if lines.is_empty() {
            "No dietary profile provided.".to_string()
        } else {
            lines.join("\n")
        }
    }
}
