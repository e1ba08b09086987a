//! Storage seams consumed by the recipe pipeline.
//!
//! Implementations must be `Send + Sync`; the orchestrator holds them as
//! `Arc<dyn …>` so tests can swap in their own.

use mise_core::{DietaryProfile, Result};

use crate::types::*;

pub trait MessageStore: Send + Sync {
    /// Messages of a conversation ordered by index.
    fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Append a message with index `max(index) + 1`. Fails with `NotFound`
    /// when the conversation does not exist.
    fn append_message(&self, message: NewMessage) -> Result<ChatMessage>;
}

pub trait ConversationStore: Send + Sync {
    fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    fn create_conversation(&self, user_id: &str) -> Result<Conversation>;

    /// Apply a patch. Fails with `NotFound` when the conversation is missing.
    fn update_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<Conversation>;
}

pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, user_id: &str) -> Result<Option<DietaryProfile>>;

    fn upsert_profile(&self, user_id: &str, profile: &DietaryProfile) -> Result<()>;
}

pub trait RecipeStore: Send + Sync {
    /// Dedup lookup by `(user_id, source_url_lower)`. Edited copies are never
    /// returned.
    fn find_by_user_and_source_url(&self, user_id: &str, url_lower: &str)
        -> Result<Option<Recipe>>;

    fn get_recipe(&self, id: i64, user_id: &str) -> Result<Option<Recipe>>;

    fn create_recipe(&self, recipe: NewRecipe) -> Result<Recipe>;

    /// Apply a patch to a recipe owned by `user_id`. Fails with `NotFound`
    /// otherwise.
    fn update_recipe(&self, id: i64, user_id: &str, patch: RecipePatch) -> Result<Recipe>;
}
