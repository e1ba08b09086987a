//! Row types for conversations, messages and recipes.

use mise_core::RecipeData;
use serde::{Deserialize, Serialize};

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored chat message. `index` is unique and increasing per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub conversation_id: String,
    pub index: i64,
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// A message to append; the store assigns index and timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
}

/// Where a conversation sits in the recipe flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Exploring,
    Decided,
    EditingRecipe,
    RecipeFound,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploring => "exploring",
            Self::Decided => "decided",
            Self::EditingRecipe => "editing_recipe",
            Self::RecipeFound => "recipe_found",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exploring" => Some(Self::Exploring),
            "decided" => Some(Self::Decided),
            "editing_recipe" => Some(Self::EditingRecipe),
            "recipe_found" => Some(Self::RecipeFound),
            _ => None,
        }
    }

    /// Transitions of the conversation state machine. Re-entering the same
    /// state is allowed (a second generation run for the same conversation).
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        use ConversationStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Exploring, Decided)
                | (Decided, RecipeFound)
                | (Exploring, EditingRecipe)
                | (RecipeFound, EditingRecipe)
                | (EditingRecipe, RecipeFound)
                | (RecipeFound, Decided)
        )
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_dish: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editing_recipe_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial conversation update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub status: Option<ConversationStatus>,
    pub decided_dish: Option<String>,
    pub search_query: Option<String>,
    pub editing_recipe_id: Option<i64>,
    pub recipe_id: Option<i64>,
}

/// A persisted recipe record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: i64,
    pub user_id: String,
    /// Public identifier (UUID v4).
    pub recipe_id: String,
    /// Lower-cased source URL; together with `user_id` the dedup key.
    pub source_url_lower: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Set on edited copies; points at the record they were derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_recipe_id: Option<i64>,
    pub recipe_data: RecipeData,
    pub is_saved: bool,
    pub has_substitutions: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields needed to insert a recipe.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub original_recipe_id: Option<i64>,
    pub recipe_data: RecipeData,
    pub has_substitutions: bool,
}

/// Partial recipe update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct RecipePatch {
    pub conversation_id: Option<String>,
    pub is_saved: Option<bool>,
}
