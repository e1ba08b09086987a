//! Pipeline data types.

use mise_store::Recipe;
use serde::{Deserialize, Serialize};

/// How far the conversation has narrowed down what to cook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    OffTopic,
    KitchenUtility,
    BroadCategory,
    DishType,
    SpecificDish,
    FullyRefined,
}

impl IntentStatus {
    /// The certainty tier implied by a status. This is the only source of
    /// `Intent::certainty`; whatever the model reports is discarded.
    pub fn certainty(&self) -> Certainty {
        match self {
            IntentStatus::FullyRefined => Certainty::High,
            IntentStatus::SpecificDish => Certainty::Medium,
            IntentStatus::BroadCategory
            | IntentStatus::DishType
            | IntentStatus::OffTopic
            | IntentStatus::KitchenUtility => Certainty::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Low,
    Medium,
    High,
}

/// Classified intent of a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub dish: String,
    pub search_query: String,
    pub status: IntentStatus,
    pub certainty: Certainty,
    pub explanation: String,
}

/// One proposed recipe source. Order in a candidate list is priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// Text extracted from a candidate page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedContent {
    pub text: String,
    pub image_url: Option<String>,
}

/// An ingredient the constraint checker rejected, with the first matching reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisallowedMatch {
    pub ingredient: String,
    pub reason: String,
}

/// Result of a successful generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedRecipe {
    pub recipe: Recipe,
    pub intent: Intent,
    pub candidate: CandidateSource,
    /// Every URL tried, in search order, ending with the winner.
    pub attempted_urls: Vec<String>,
    /// True when an existing record for the same dedup key was reused.
    pub reused: bool,
}

/// Result of a successful edit run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditedRecipe {
    pub recipe: Recipe,
    pub original_recipe_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certainty_mapping() {
        assert_eq!(IntentStatus::FullyRefined.certainty(), Certainty::High);
        assert_eq!(IntentStatus::SpecificDish.certainty(), Certainty::Medium);
        assert_eq!(IntentStatus::BroadCategory.certainty(), Certainty::Low);
        assert_eq!(IntentStatus::DishType.certainty(), Certainty::Low);
    }

    #[test]
    fn test_status_wire_names() {
        let status: IntentStatus = serde_json::from_str("\"kitchen_utility\"").unwrap();
        assert_eq!(status, IntentStatus::KitchenUtility);
        assert_eq!(
            serde_json::to_value(IntentStatus::FullyRefined).unwrap(),
            "fully_refined"
        );
        assert!(serde_json::from_str::<IntentStatus>("\"vague\"").is_err());
    }
}
