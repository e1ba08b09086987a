//! End-to-end recipe generation.
//!
//! `generate_recipe` runs intent → search → per-candidate {scrape → format →
//! check → [substitute]} → dedup → persist, walking candidates strictly in
//! order and stopping at the first that completes every stage.
//! `edit_recipe` reformats an existing recipe against the conversation and
//! saves the result as a new record.

use std::future::Future;
use std::sync::Arc;

use mise_core::{DietaryProfile, RecipeData};
use mise_llm::LlmClient;
use mise_store::{
    ChatMessage, Conversation, ConversationPatch, ConversationStatus, ConversationStore,
    MessageStore, NewRecipe, ProfileStore, Recipe, RecipePatch, RecipeStore,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PipelineSettings;
use crate::constraints;
use crate::error::*;
use crate::format::RecipeFormatter;
use crate::intent::IntentExtractor;
use crate::policy::{CandidateAttempts, Decision, StopReason};
use crate::scrape::{ContentScraper, PageFetcher};
use crate::search::CandidateSearch;
use crate::substitute::SubstitutionEngine;
use crate::types::*;

/// Storage collaborators.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub recipes: Arc<dyn RecipeStore>,
}

impl Stores {
    /// All four roles served by one store.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: MessageStore + ConversationStore + ProfileStore + RecipeStore + 'static,
    {
        Self {
            messages: store.clone(),
            conversations: store.clone(),
            profiles: store.clone(),
            recipes: store,
        }
    }
}

/// A candidate that passed every stage.
struct Finished {
    recipe: RecipeData,
    substituted: bool,
}

pub struct Orchestrator {
    stores: Stores,
    intent: IntentExtractor,
    search: CandidateSearch,
    scraper: ContentScraper,
    formatter: RecipeFormatter,
    substitution: SubstitutionEngine,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        stores: Stores,
        llm: Arc<dyn LlmClient>,
        fetcher: Arc<dyn PageFetcher>,
        settings: PipelineSettings,
    ) -> Self {
        let tokens = &settings.max_tokens;
        Self {
            intent: IntentExtractor::new(llm.clone(), tokens.intent),
            search: CandidateSearch::new(
                llm.clone(),
                settings.blocked_domains.clone(),
                settings.max_candidates,
                tokens.search,
            ),
            scraper: ContentScraper::new(fetcher, settings.min_scrape_chars),
            formatter: RecipeFormatter::new(
                llm.clone(),
                tokens.format,
                settings.max_format_input_chars,
            ),
            substitution: SubstitutionEngine::new(
                llm,
                tokens.substitute,
                settings.unresolved_policy,
            ),
            stores,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Produce one persisted, constraint-checked recipe for a conversation.
    pub async fn generate_recipe(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<GeneratedRecipe, PipelineError> {
        let conversation = self.preflight(conversation_id, user_id)?;
        let messages = self.load_messages(conversation_id)?;
        let profile = self.load_profile(user_id)?;
        info!(
            "Generating recipe for conversation {} ({} messages)",
            conversation_id,
            messages.len()
        );

        let intent = self
            .within(self.intent.extract(&messages, &profile), IntentError::Timeout)
            .await?;
        if intent.status == IntentStatus::OffTopic {
            info!("Conversation {} is off topic", conversation_id);
            return Err(PipelineError::OffTopic {
                explanation: intent.explanation,
            });
        }

        let conversation = self.transition(
            &conversation,
            ConversationStatus::Decided,
            ConversationPatch {
                decided_dish: Some(intent.dish.clone()),
                search_query: Some(intent.search_query.clone()),
                ..Default::default()
            },
        )?;

        debug!("Searching candidates for '{}'", intent.search_query);
        let candidates = self
            .within(
                self.search.search(&intent.search_query, &profile),
                SearchError::Timeout,
            )
            .await?;
        if candidates.is_empty() {
            return Err(PipelineError::NoCandidates {
                query: intent.search_query,
            });
        }

        let mut attempts = CandidateAttempts::new(&candidates);
        let mut finished = None;
        while let Some(candidate) = attempts.next_candidate() {
            match self.try_candidate(candidate, &profile).await {
                Ok(done) => {
                    attempts.record(candidate, Ok(()));
                    finished = Some(done);
                }
                Err(e) => {
                    warn!(
                        "Candidate {} failed at {}: {}",
                        candidate.url,
                        e.stage(),
                        e
                    );
                    attempts.record(candidate, Err(e));
                }
            }
        }

        let attempted_urls = attempts.attempted_urls();
        let won = match attempts.decision() {
            Decision::Stop(StopReason::Won { index }) => candidates.get(index).zip(finished),
            _ => None,
        };
        let Some((candidate, finished)) = won else {
            let last_error = match attempts.last_error() {
                Some(e) => e.clone(),
                None => {
                    return Err(PipelineError::NoCandidates {
                        query: intent.search_query,
                    })
                }
            };
            warn!(
                "All {} candidates failed for conversation {}",
                attempted_urls.len(),
                conversation_id
            );
            return Err(PipelineError::AllCandidatesExhausted {
                attempted_urls,
                last_error,
            });
        };

        let (recipe, reused) = self.dedup_or_create(conversation_id, user_id, finished)?;
        self.transition(
            &conversation,
            ConversationStatus::RecipeFound,
            ConversationPatch {
                recipe_id: Some(recipe.id),
                ..Default::default()
            },
        )?;
        info!(
            "Recipe {} '{}' from {} for conversation {} (reused: {}, attempts: {})",
            recipe.id,
            recipe.recipe_data.title,
            candidate.url,
            conversation_id,
            reused,
            attempted_urls.len()
        );

        Ok(GeneratedRecipe {
            recipe,
            intent,
            candidate: candidate.clone(),
            attempted_urls,
            reused,
        })
    }

    /// Rework an existing recipe following the conversation. The result is
    /// stored as a new record pointing back at `recipe_id`; the original is
    /// left untouched.
    pub async fn edit_recipe(
        &self,
        conversation_id: &str,
        user_id: &str,
        recipe_id: i64,
    ) -> Result<EditedRecipe, PipelineError> {
        let conversation = self.preflight(conversation_id, user_id)?;
        let messages = self.load_messages(conversation_id)?;
        let original = self
            .stores
            .recipes
            .get_recipe(recipe_id, user_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("recipe {}", recipe_id)))?;
        let profile = self.load_profile(user_id)?;
        info!(
            "Editing recipe {} for conversation {}",
            recipe_id, conversation_id
        );

        let conversation = self.transition(
            &conversation,
            ConversationStatus::EditingRecipe,
            ConversationPatch {
                editing_recipe_id: Some(recipe_id),
                ..Default::default()
            },
        )?;

        let source_url = original.recipe_data.source_url.clone();
        let finished = match self.rework(&original.recipe_data, &messages, &profile).await {
            Ok(finished) => finished,
            Err(e) => {
                warn!("Edit of recipe {} failed at {}: {}", recipe_id, e.stage(), e);
                return Err(PipelineError::AllCandidatesExhausted {
                    attempted_urls: vec![source_url],
                    last_error: e,
                });
            }
        };

        let recipe = self.stores.recipes.create_recipe(NewRecipe {
            user_id: user_id.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            original_recipe_id: Some(original.id),
            recipe_data: finished.recipe,
            has_substitutions: finished.substituted,
        })?;
        self.transition(
            &conversation,
            ConversationStatus::RecipeFound,
            ConversationPatch {
                recipe_id: Some(recipe.id),
                ..Default::default()
            },
        )?;
        info!(
            "Saved edited recipe {} (from {}) for conversation {}",
            recipe.id, original.id, conversation_id
        );

        Ok(EditedRecipe {
            recipe,
            original_recipe_id: original.id,
        })
    }

    fn preflight(&self, conversation_id: &str, user_id: &str) -> Result<Conversation, PipelineError> {
        if conversation_id.trim().is_empty() {
            return Err(PipelineError::Validation("conversationId is required".into()));
        }
        if user_id.trim().is_empty() {
            return Err(PipelineError::Validation("userId is required".into()));
        }
        // Another user's conversation is indistinguishable from a missing one
        match self.stores.conversations.get_conversation(conversation_id)? {
            Some(c) if c.user_id == user_id => Ok(c),
            _ => Err(PipelineError::NotFound(format!(
                "conversation {}",
                conversation_id
            ))),
        }
    }

    fn load_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>, PipelineError> {
        let messages = self.stores.messages.list_messages(conversation_id)?;
        if messages.is_empty() {
            return Err(PipelineError::NoMessages(conversation_id.to_string()));
        }
        Ok(messages)
    }

    fn load_profile(&self, user_id: &str) -> Result<DietaryProfile, PipelineError> {
        Ok(self.stores.profiles.get_profile(user_id)?.unwrap_or_default())
    }

    fn transition(
        &self,
        conversation: &Conversation,
        next: ConversationStatus,
        mut patch: ConversationPatch,
    ) -> Result<Conversation, PipelineError> {
        if !conversation.status.can_transition_to(next) {
            warn!(
                "Conversation {} moving {} -> {} outside the usual flow",
                conversation.conversation_id,
                conversation.status.as_str(),
                next.as_str()
            );
        }
        debug!(
            "Conversation {}: {} -> {}",
            conversation.conversation_id,
            conversation.status.as_str(),
            next.as_str()
        );
        patch.status = Some(next);
        Ok(self
            .stores
            .conversations
            .update_conversation(&conversation.conversation_id, patch)?)
    }

    /// Run `stage` under the per-stage deadline.
    async fn within<T, E>(
        &self,
        stage: impl Future<Output = Result<T, E>>,
        on_timeout: E,
    ) -> Result<T, E> {
        match timeout(self.settings.stage_timeout(), stage).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout),
        }
    }

    async fn try_candidate(
        &self,
        candidate: &CandidateSource,
        profile: &DietaryProfile,
    ) -> Result<Finished, StageError> {
        let url = candidate.url.as_str();
        debug!("Scraping {}", url);
        let scraped = self
            .within(
                self.scraper.scrape(url, self.settings.site_heuristics),
                ScrapeError::Timeout,
            )
            .await?;
        debug!("Formatting {}", url);
        let recipe = self
            .within(self.formatter.format(&scraped, url, profile), FormatError::Timeout)
            .await?;
        self.check_and_substitute(recipe, profile).await
    }

    async fn rework(
        &self,
        original: &RecipeData,
        messages: &[ChatMessage],
        profile: &DietaryProfile,
    ) -> Result<Finished, StageError> {
        let scraped = ScrapedContent {
            text: edit_source_text(original, messages),
            image_url: original.image_url.clone(),
        };
        let recipe = self
            .within(
                self.formatter.format(&scraped, &original.source_url, profile),
                FormatError::Timeout,
            )
            .await?;
        self.check_and_substitute(recipe, profile).await
    }

    async fn check_and_substitute(
        &self,
        recipe: RecipeData,
        profile: &DietaryProfile,
    ) -> Result<Finished, StageError> {
        let disallowed = constraints::check(&recipe.ingredients, profile);
        if disallowed.is_empty() {
            return Ok(Finished {
                recipe,
                substituted: false,
            });
        }
        info!(
            "'{}' has {} disallowed ingredients, substituting",
            recipe.title,
            disallowed.len()
        );
        let recipe = self
            .within(
                self.substitution.substitute(recipe, &disallowed, profile),
                SubstitutionError::Timeout,
            )
            .await?;
        Ok(Finished {
            recipe,
            substituted: true,
        })
    }

    /// Reuse the user's recipe for the same source URL, or create one. The
    /// lookup and insert are separate statements; two concurrent runs can
    /// both miss and create duplicates.
    fn dedup_or_create(
        &self,
        conversation_id: &str,
        user_id: &str,
        finished: Finished,
    ) -> Result<(Recipe, bool), PipelineError> {
        let url_lower = finished.recipe.source_url.to_lowercase();
        if let Some(existing) = self
            .stores
            .recipes
            .find_by_user_and_source_url(user_id, &url_lower)?
        {
            debug!("Reusing recipe {} for {}", existing.id, url_lower);
            if finished.substituted && !existing.has_substitutions {
                warn!(
                    "Recipe {} predates substitutions for the current profile; \
                     reusing it unchanged",
                    existing.id
                );
            }
            if existing.conversation_id.as_deref() == Some(conversation_id) {
                return Ok((existing, true));
            }
            let linked = self.stores.recipes.update_recipe(
                existing.id,
                user_id,
                RecipePatch {
                    conversation_id: Some(conversation_id.to_string()),
                    ..Default::default()
                },
            )?;
            return Ok((linked, true));
        }

        let created = self.stores.recipes.create_recipe(NewRecipe {
            user_id: user_id.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            original_recipe_id: None,
            recipe_data: finished.recipe,
            has_substitutions: finished.substituted,
        })?;
        Ok((created, false))
    }
}

/// Text handed to the formatter when editing: the current recipe followed by
/// the conversation asking for changes.
fn edit_source_text(recipe: &RecipeData, messages: &[ChatMessage]) -> String {
    let mut lines = vec![format!("Current recipe: {}", recipe.title)];
    if let Some(description) = &recipe.description {
        lines.push(description.clone());
    }
    lines.push(format!("Serves: {}", recipe.portions));
    lines.push("Ingredients:".into());
    lines.extend(recipe.ingredients.iter().map(|i| format!("- {}", i)));
    lines.push("Instructions:".into());
    lines.extend(
        recipe
            .instructions
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s)),
    );
    if let Some(n) = &recipe.nutrition {
        lines.push(format!(
            "Nutrition per portion{}: {} calories, {} g protein, {} g carbs, {} g fat",
            if n.ai_estimated { " (estimated)" } else { "" },
            n.calories_per_portion,
            n.protein,
            n.carbs,
            n.fat
        ));
    }
    lines.push(String::new());
    lines.push("Apply the changes requested in this conversation to the recipe above:".into());
    lines.extend(
        messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content.trim())),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnresolvedPolicy;
    use crate::scrape::FetchedPage;
    use crate::test_support::*;
    use mise_llm::LlmTask;
    use mise_store::{NewMessage, Role, SqliteStore};
    use std::time::Duration;
    use tempfile::TempDir;

    const USER: &str = "user-1";

    struct Harness {
        _dir: TempDir,
        store: Arc<SqliteStore>,
        llm: Arc<ScriptedLlm>,
        fetcher: Arc<MapFetcher>,
        orchestrator: Orchestrator,
    }

    fn harness(llm: ScriptedLlm, fetcher: MapFetcher) -> Harness {
        harness_with(llm, fetcher, PipelineSettings::default())
    }

    fn harness_with(llm: ScriptedLlm, fetcher: MapFetcher, settings: PipelineSettings) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        let llm = Arc::new(llm);
        let fetcher = Arc::new(fetcher);
        let orchestrator = Orchestrator::new(
            Stores::from_shared(store.clone()),
            llm.clone(),
            fetcher.clone(),
            settings,
        );
        Harness {
            _dir: dir,
            store,
            llm,
            fetcher,
            orchestrator,
        }
    }

    impl Harness {
        fn conversation(&self, user_id: &str, messages: &[&str]) -> String {
            let conversation = self.store.create_conversation(user_id).unwrap();
            for (i, content) in messages.iter().enumerate() {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                self.store
                    .append_message(NewMessage {
                        conversation_id: conversation.conversation_id.clone(),
                        role,
                        content: content.to_string(),
                    })
                    .unwrap();
            }
            conversation.conversation_id
        }

        fn status(&self, conversation_id: &str) -> Conversation {
            self.store.get_conversation(conversation_id).unwrap().unwrap()
        }
    }

    fn intent(status: &str, dish: &str) -> String {
        serde_json::json!({
            "dish": dish,
            "searchQuery": format!("{} recipe", dish),
            "status": status,
            "explanation": "Let's cook."
        })
        .to_string()
    }

    fn search(urls: &[&str]) -> String {
        let list: Vec<serde_json::Value> = urls
            .iter()
            .map(|u| serde_json::json!({"title": "Recipe", "url": u, "snippet": ""}))
            .collect();
        serde_json::Value::Array(list).to_string()
    }

    fn urls(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://site{}.example/recipe", i)).collect()
    }

    #[tokio::test]
    async fn test_third_candidate_wins_after_short_pages() {
        let urls = urls(5);
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Pad Thai"))
            .respond(LlmTask::SearchCandidates, search(&url_refs))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Pad Thai", &["8 oz rice noodles", "2 eggs"]),
            );
        let fetcher = MapFetcher::new()
            .with(&urls[0], page_with_text(50))
            .with(&urls[1], page_with_text(120))
            .with(&urls[2], page_with_text(1500))
            .with(&urls[3], page_with_text(1500))
            .with(&urls[4], page_with_text(1500));
        let h = harness(llm, fetcher);
        let conv = h.conversation(USER, &["Pad thai tonight?"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        assert_eq!(out.recipe.recipe_data.source_url, urls[2]);
        assert_eq!(out.candidate.url, urls[2]);
        assert_eq!(out.attempted_urls, urls[..3].to_vec());
        assert!(!out.recipe.has_substitutions);
        assert!(!out.reused);
        // Candidates after the winner are never fetched
        assert_eq!(h.fetcher.fetched(), urls[..3].to_vec());
        assert_eq!(h.llm.calls_for(LlmTask::FormatRecipe), 1);
        assert_eq!(h.llm.calls_for(LlmTask::SubstituteIngredients), 0);

        let conversation = h.status(&conv);
        assert_eq!(conversation.status, ConversationStatus::RecipeFound);
        assert_eq!(conversation.recipe_id, Some(out.recipe.id));
        assert_eq!(conversation.decided_dish.as_deref(), Some("Pad Thai"));
        assert_eq!(conversation.search_query.as_deref(), Some("Pad Thai recipe"));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_url() {
        let urls = urls(3);
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("dish_type", "curry"))
            .respond(LlmTask::SearchCandidates, search(&url_refs))
            .respond(LlmTask::FormatRecipe, r#"{"title": "Curry", "portions": 2, "ingredients": [], "instructions": ["x"]}"#);
        let fetcher = MapFetcher::new()
            .with(
                &urls[0],
                Ok(FetchedPage {
                    status: 403,
                    html: String::new(),
                }),
            )
            .with(&urls[1], page_with_text(10))
            .with(&urls[2], page_with_text(800));
        let h = harness(llm, fetcher);
        let conv = h.conversation(USER, &["some kind of curry"]);

        let err = h.orchestrator.generate_recipe(&conv, USER).await.unwrap_err();
        match err {
            PipelineError::AllCandidatesExhausted {
                attempted_urls,
                last_error,
            } => {
                assert_eq!(attempted_urls, urls);
                assert_eq!(last_error.stage(), Stage::Formatting);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(h.status(&conv).status, ConversationStatus::Decided);
        assert_eq!(h.store.count_recipes().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_source_url_is_reused_across_conversations() {
        let url = "https://www.seriouseats.com/kung-pao-chicken";
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("fully_refined", "Kung Pao Chicken"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(LlmTask::FormatRecipe, format_output("Kung Pao Chicken", &["1 lb chicken"]))
            .respond(LlmTask::ClassifyIntent, intent("fully_refined", "Kung Pao Chicken"))
            .respond(
                LlmTask::SearchCandidates,
                search(&["https://WWW.SeriousEats.com/kung-pao-chicken"]),
            )
            .respond(LlmTask::FormatRecipe, format_output("Kung Pao Chicken", &["1 lb chicken"]));
        let fetcher = MapFetcher::new()
            .with(url, page_with_text(900))
            .with("https://WWW.SeriousEats.com/kung-pao-chicken", page_with_text(900));
        let h = harness(llm, fetcher);

        let first_conv = h.conversation(USER, &["kung pao please"]);
        let second_conv = h.conversation(USER, &["kung pao again"]);
        let first = h.orchestrator.generate_recipe(&first_conv, USER).await.unwrap();
        let second = h.orchestrator.generate_recipe(&second_conv, USER).await.unwrap();

        assert!(!first.reused);
        assert!(second.reused);
        assert_eq!(first.recipe.id, second.recipe.id);
        assert_eq!(second.recipe.conversation_id.as_deref(), Some(second_conv.as_str()));
        assert_eq!(h.store.count_recipes().unwrap(), 1);
        assert_eq!(h.status(&second_conv).recipe_id, Some(first.recipe.id));
    }

    #[tokio::test]
    async fn test_shellfish_allergy_is_substituted() {
        let url = "https://a.example/garlic-shrimp";
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Garlic Shrimp"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Shrimp", &["2 lbs shrimp", "4 cloves garlic"]),
            )
            .respond(
                LlmTask::SubstituteIngredients,
                r#"{"ingredients": ["2 lbs chicken thigh", "4 cloves garlic"],
                    "instructions": ["Sear chicken.", "Add garlic."],
                    "substitutions": [{"original": "shrimp", "substituted": "chicken thigh",
                        "reason": "allergy: shellfish", "originalIngredient": "2 lbs shrimp",
                        "substitutedIngredient": "2 lbs chicken thigh"}]}"#,
            );
        let fetcher = MapFetcher::new().with(url, page_with_text(1000));
        let h = harness(llm, fetcher);
        h.store
            .upsert_profile(
                USER,
                &DietaryProfile {
                    allergens: vec!["shellfish".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        let conv = h.conversation(USER, &["garlic shrimp"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        let stored = h.store.get_recipe(out.recipe.id, USER).unwrap().unwrap();
        assert!(stored.has_substitutions);
        assert!(stored
            .recipe_data
            .ingredients
            .iter()
            .all(|i| !i.contains("shrimp")));
        let subs = stored.recipe_data.substitutions.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].original, "shrimp");

        let substitute_call = h
            .llm
            .calls()
            .into_iter()
            .find(|c| c.task == LlmTask::SubstituteIngredients)
            .unwrap();
        assert!(substitute_call
            .prompt
            .contains("2 lbs shrimp (allergy: shellfish)"));
    }

    impl Harness {
        fn allergic_to_shellfish(&self) {
            self.store
                .upsert_profile(
                    USER,
                    &DietaryProfile {
                        allergens: vec!["shellfish".into()],
                        ..Default::default()
                    },
                )
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_substitution_moves_to_next_candidate() {
        let urls = urls(2);
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Garlic Shrimp"))
            .respond(LlmTask::SearchCandidates, search(&[urls[0].as_str(), urls[1].as_str()]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Shrimp", &["2 lbs shrimp", "4 cloves garlic"]),
            )
            .respond(LlmTask::SubstituteIngredients, "not json")
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Chicken", &["2 lbs chicken thigh", "4 cloves garlic"]),
            );
        let fetcher = MapFetcher::new()
            .with(&urls[0], page_with_text(1000))
            .with(&urls[1], page_with_text(1000));
        let h = harness(llm, fetcher);
        h.allergic_to_shellfish();
        let conv = h.conversation(USER, &["garlic shrimp"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        assert_eq!(out.candidate.url, urls[1]);
        assert_eq!(out.attempted_urls, urls);
        assert!(!out.recipe.has_substitutions);
        assert_eq!(h.llm.calls_for(LlmTask::SubstituteIngredients), 1);
    }

    #[tokio::test]
    async fn test_reject_policy_moves_to_next_candidate() {
        let urls = urls(2);
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Garlic Shrimp"))
            .respond(LlmTask::SearchCandidates, search(&[urls[0].as_str(), urls[1].as_str()]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Shrimp", &["2 lbs shrimp", "4 cloves garlic"]),
            )
            .respond(
                LlmTask::SubstituteIngredients,
                r#"{"ingredients": ["2 lbs prawns", "4 cloves garlic"],
                    "instructions": ["Sear prawns.", "Add garlic."],
                    "substitutions": [{"original": "shrimp", "substituted": "prawns",
                        "reason": "allergy: shellfish", "originalIngredient": "2 lbs shrimp",
                        "substitutedIngredient": "2 lbs prawns"}]}"#,
            )
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Tofu", &["1 block tofu", "4 cloves garlic"]),
            );
        let fetcher = MapFetcher::new()
            .with(&urls[0], page_with_text(1000))
            .with(&urls[1], page_with_text(1000));
        let settings = PipelineSettings {
            unresolved_policy: UnresolvedPolicy::Reject,
            ..Default::default()
        };
        let h = harness_with(llm, fetcher, settings);
        h.allergic_to_shellfish();
        let conv = h.conversation(USER, &["garlic shrimp"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        assert_eq!(out.candidate.url, urls[1]);
        assert_eq!(out.recipe.recipe_data.title, "Garlic Tofu");
        assert_eq!(out.attempted_urls, urls);
        assert!(!out.recipe.has_substitutions);
    }

    #[tokio::test]
    async fn test_format_failure_moves_to_next_candidate() {
        let urls = urls(2);
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Dal"))
            .respond(LlmTask::SearchCandidates, search(&[urls[0].as_str(), urls[1].as_str()]))
            .respond(LlmTask::FormatRecipe, "Sorry, I cannot format this page.")
            .respond(LlmTask::FormatRecipe, format_output("Dal", &["1 cup toor dal"]));
        let fetcher = MapFetcher::new()
            .with(&urls[0], page_with_text(1000))
            .with(&urls[1], page_with_text(1000));
        let h = harness(llm, fetcher);
        let conv = h.conversation(USER, &["dal"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        assert_eq!(out.candidate.url, urls[1]);
        assert_eq!(out.attempted_urls, urls);
        assert_eq!(h.llm.calls_for(LlmTask::FormatRecipe), 2);
    }

    #[tokio::test]
    async fn test_reuse_keeps_stored_record_after_profile_change() {
        let url = "https://a.example/garlic-shrimp";
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Garlic Shrimp"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Shrimp", &["2 lbs shrimp", "4 cloves garlic"]),
            )
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Garlic Shrimp"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Garlic Shrimp", &["2 lbs shrimp", "4 cloves garlic"]),
            )
            .respond(
                LlmTask::SubstituteIngredients,
                r#"{"ingredients": ["2 lbs chicken thigh", "4 cloves garlic"],
                    "instructions": ["Sear chicken.", "Add garlic."],
                    "substitutions": [{"original": "shrimp", "substituted": "chicken thigh",
                        "reason": "allergy: shellfish", "originalIngredient": "2 lbs shrimp",
                        "substitutedIngredient": "2 lbs chicken thigh"}]}"#,
            );
        let h = harness(llm, MapFetcher::new().with(url, page_with_text(1000)));
        let first_conv = h.conversation(USER, &["garlic shrimp"]);
        let first = h.orchestrator.generate_recipe(&first_conv, USER).await.unwrap();
        assert!(!first.recipe.has_substitutions);

        h.allergic_to_shellfish();
        let second_conv = h.conversation(USER, &["garlic shrimp again"]);
        let second = h.orchestrator.generate_recipe(&second_conv, USER).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.recipe.id, first.recipe.id);
        assert!(!second.recipe.has_substitutions);
        assert_eq!(h.llm.calls_for(LlmTask::SubstituteIngredients), 1);
    }

    #[tokio::test]
    async fn test_kung_pao_certainty_high() {
        let url = "https://a.example/kung-pao";
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("fully_refined", "Spicy Kung Pao Chicken"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(LlmTask::FormatRecipe, format_output("Kung Pao Chicken", &["1 lb chicken"]));
        let h = harness(llm, MapFetcher::new().with(url, page_with_text(700)));
        let conv = h.conversation(USER, &["I want spicy Kung Pao Chicken"]);

        let out = h.orchestrator.generate_recipe(&conv, USER).await.unwrap();
        assert_eq!(out.intent.status, IntentStatus::FullyRefined);
        assert_eq!(out.intent.certainty, Certainty::High);
    }

    #[tokio::test]
    async fn test_off_topic_stops_before_search() {
        let llm = ScriptedLlm::new().respond(LlmTask::ClassifyIntent, intent("off_topic", ""));
        let h = harness(llm, MapFetcher::new());
        let conv = h.conversation(USER, &["how do I file taxes"]);

        let err = h.orchestrator.generate_recipe(&conv, USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::OffTopic { .. }));
        assert_eq!(err.code(), "off_topic");
        assert_eq!(h.llm.calls_for(LlmTask::SearchCandidates), 0);
        assert!(h.fetcher.fetched().is_empty());
        assert_eq!(h.status(&conv).status, ConversationStatus::Exploring);
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Zoodles"))
            .respond(LlmTask::SearchCandidates, "[]");
        let h = harness(llm, MapFetcher::new());
        let conv = h.conversation(USER, &["zoodles"]);

        let err = h.orchestrator.generate_recipe(&conv, USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoCandidates { ref query } if query == "Zoodles recipe"));
        assert_eq!(h.status(&conv).status, ConversationStatus::Decided);
    }

    #[tokio::test]
    async fn test_preflight_errors() {
        let h = harness(ScriptedLlm::new(), MapFetcher::new());
        let empty = h.conversation(USER, &[]);

        let err = h.orchestrator.generate_recipe(&empty, USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoMessages(_)));
        assert!(h.llm.calls().is_empty());

        let err = h.orchestrator.generate_recipe("  ", USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        let err = h.orchestrator.generate_recipe(&empty, "").await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let err = h.orchestrator.generate_recipe(&empty, "someone-else").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        let err = h.orchestrator.generate_recipe("missing", USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_intent_parse_failure_is_fatal() {
        let llm = ScriptedLlm::new().respond(LlmTask::ClassifyIntent, "pasta, probably");
        let h = harness(llm, MapFetcher::new());
        let conv = h.conversation(USER, &["pasta?"]);
        let err = h.orchestrator.generate_recipe(&conv, USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::Intent(IntentError::Parse(_))));
        assert_eq!(err.code(), "intent_failed");
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Pho"))
            .with_delay(Duration::from_millis(1500));
        let settings = PipelineSettings {
            stage_timeout_secs: 1,
            ..Default::default()
        };
        let h = harness_with(llm, MapFetcher::new(), settings);
        let conv = h.conversation(USER, &["pho"]);
        let err = h.orchestrator.generate_recipe(&conv, USER).await.unwrap_err();
        assert!(matches!(err, PipelineError::Intent(IntentError::Timeout)));
    }

    #[tokio::test]
    async fn test_edit_creates_new_record() {
        let url = "https://a.example/chili";
        let llm = ScriptedLlm::new()
            .respond(LlmTask::ClassifyIntent, intent("specific_dish", "Chili"))
            .respond(LlmTask::SearchCandidates, search(&[url]))
            .respond(LlmTask::FormatRecipe, format_output("Chili", &["1 lb beef", "1 can beans"]))
            .respond(
                LlmTask::FormatRecipe,
                format_output("Vegetarian Chili", &["1 lb mushrooms", "1 can beans"]),
            );
        let h = harness(llm, MapFetcher::new().with(url, page_with_text(900)));
        let first_conv = h.conversation(USER, &["chili"]);
        let original = h
            .orchestrator
            .generate_recipe(&first_conv, USER)
            .await
            .unwrap()
            .recipe;

        let edit_conv = h.conversation(USER, &["make my chili vegetarian"]);
        let edited = h
            .orchestrator
            .edit_recipe(&edit_conv, USER, original.id)
            .await
            .unwrap();
        assert_ne!(edited.recipe.id, original.id);
        assert_eq!(edited.original_recipe_id, original.id);
        assert_eq!(edited.recipe.original_recipe_id, Some(original.id));
        assert_eq!(edited.recipe.recipe_data.source_url, url);
        assert_eq!(edited.recipe.recipe_data.title, "Vegetarian Chili");

        let untouched = h.store.get_recipe(original.id, USER).unwrap().unwrap();
        assert_eq!(untouched.recipe_data, original.recipe_data);

        let conversation = h.status(&edit_conv);
        assert_eq!(conversation.status, ConversationStatus::RecipeFound);
        assert_eq!(conversation.editing_recipe_id, Some(original.id));
        assert_eq!(conversation.recipe_id, Some(edited.recipe.id));

        let calls = h.llm.calls();
        let prompt = &calls.last().unwrap().prompt;
        assert!(prompt.contains("- 1 lb beef"));
        assert!(prompt.contains("user: make my chili vegetarian"));

        // Edited copies never satisfy the dedup lookup
        let hit = h
            .store
            .find_by_user_and_source_url(USER, url)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, original.id);
    }

    #[tokio::test]
    async fn test_edit_of_foreign_recipe_is_not_found() {
        let h = harness(ScriptedLlm::new(), MapFetcher::new());
        let recipe = h
            .store
            .create_recipe(NewRecipe {
                user_id: "owner".into(),
                conversation_id: None,
                original_recipe_id: None,
                recipe_data: sample_recipe("Soup", "https://a.example/soup", &["water"]),
                has_substitutions: false,
            })
            .unwrap();
        let conv = h.conversation(USER, &["change the soup"]);
        let err = h
            .orchestrator
            .edit_recipe(&conv, USER, recipe.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert_eq!(h.status(&conv).status, ConversationStatus::Exploring);
    }
}
