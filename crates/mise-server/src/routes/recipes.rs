//! Recipe generation, editing and lookup.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use mise_pipeline::{EditedRecipe, GeneratedRecipe};
use mise_store::{Recipe, RecipePatch, RecipeStore};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate-recipe", post(generate_recipe))
        .route("/edit-recipe", post(edit_recipe))
        .route("/recipes/{id}", get(get_recipe).patch(update_recipe))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditRequest {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    recipe_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerQuery {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    is_saved: Option<bool>,
}

fn require(value: &str, name: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("{} is required", name)));
    }
    Ok(())
}

/// POST /api/generate-recipe
async fn generate_recipe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GeneratedRecipe>), ApiError> {
    require(&req.conversation_id, "conversationId")?;
    require(&req.user_id, "userId")?;

    let generated = state
        .orchestrator()?
        .generate_recipe(&req.conversation_id, &req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(generated)))
}

/// POST /api/edit-recipe
async fn edit_recipe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EditRequest>,
) -> Result<(StatusCode, Json<EditedRecipe>), ApiError> {
    require(&req.conversation_id, "conversationId")?;
    require(&req.user_id, "userId")?;
    let recipe_id = req
        .recipe_id
        .ok_or_else(|| ApiError::validation("recipeId is required"))?;

    let edited = state
        .orchestrator()?
        .edit_recipe(&req.conversation_id, &req.user_id, recipe_id)
        .await?;
    Ok((StatusCode::CREATED, Json(edited)))
}

/// GET /api/recipes/{id}?userId=
async fn get_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Recipe>, ApiError> {
    let user_id = query.user_id.unwrap_or_default();
    require(&user_id, "userId")?;

    state
        .store
        .get_recipe(id, &user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("recipe {}", id)))
}

/// PATCH /api/recipes/{id}
async fn update_recipe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<Recipe>, ApiError> {
    require(&req.user_id, "userId")?;

    let recipe = state.store.update_recipe(
        id,
        &req.user_id,
        RecipePatch {
            is_saved: req.is_saved,
            ..Default::default()
        },
    )?;
    Ok(Json(recipe))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use mise_llm::{LlmClient, LlmTask};
    use mise_pipeline::test_support::{format_output, page_with_text, MapFetcher, ScriptedLlm};
    use mise_store::{ConversationStore, MessageStore, NewMessage, Role};
    use serde_json::json;

    use crate::routes::testing::TestApp;

    const URL: &str = "https://site1.example/kung-pao";

    fn scripted() -> ScriptedLlm {
        ScriptedLlm::new()
            .respond(
                LlmTask::ClassifyIntent,
                json!({
                    "dish": "Kung Pao Chicken",
                    "searchQuery": "spicy kung pao chicken recipe",
                    "status": "fully_refined",
                    "explanation": "A specific dish."
                })
                .to_string(),
            )
            .respond(
                LlmTask::SearchCandidates,
                json!([{"title": "Kung Pao", "url": URL, "snippet": ""}]).to_string(),
            )
            .respond(
                LlmTask::FormatRecipe,
                format_output("Kung Pao Chicken", &["1 lb chicken", "1 cup peanuts"]),
            )
    }

    fn app_with(llm: ScriptedLlm) -> TestApp {
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        TestApp::new(Some(llm), MapFetcher::new().with(URL, page_with_text(1500)))
    }

    fn seed_conversation(app: &TestApp, user_id: &str) -> String {
        let conversation = app.state.store.create_conversation(user_id).unwrap();
        app.state
            .store
            .append_message(NewMessage {
                conversation_id: conversation.conversation_id.clone(),
                role: Role::User,
                content: "I want spicy Kung Pao Chicken".into(),
            })
            .unwrap();
        conversation.conversation_id
    }

    #[tokio::test]
    async fn test_generate_recipe_created() {
        let app = app_with(scripted());
        let conversation_id = seed_conversation(&app, "u1");

        let (status, body) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": conversation_id, "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["intent"]["certainty"], "high");
        assert_eq!(body["recipe"]["recipeData"]["sourceUrl"], URL);
        assert_eq!(body["recipe"]["hasSubstitutions"], false);
        assert_eq!(body["attemptedUrls"], json!([URL]));
        assert_eq!(body["reused"], false);
        assert_eq!(app.fetcher.fetched(), vec![URL.to_string()]);

        let id = body["recipe"]["id"].as_i64().unwrap();
        let (status, fetched) = app
            .send("GET", &format!("/api/recipes/{}?userId=u1", id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["recipeData"]["title"], "Kung Pao Chicken");

        let (status, _) = app
            .send("GET", &format!("/api/recipes/{}?userId=someone-else", id), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_before_llm_check() {
        let app = TestApp::new(None, MapFetcher::new());
        let (status, body) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": "", "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation");

        let (status, body) = app
            .send(
                "POST",
                "/api/edit-recipe",
                Some(json!({"conversationId": "c", "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "recipeId is required");
    }

    #[tokio::test]
    async fn test_generate_without_llm_unavailable() {
        let app = TestApp::new(None, MapFetcher::new());
        let conversation_id = seed_conversation(&app, "u1");
        let (status, body) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": conversation_id, "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "unavailable");
    }

    #[tokio::test]
    async fn test_generate_exhausted_trail() {
        let llm: Arc<dyn LlmClient> = Arc::new(scripted());
        let app = TestApp::new(Some(llm), MapFetcher::new().with(URL, page_with_text(50)));
        let conversation_id = seed_conversation(&app, "u1");

        let (status, body) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": conversation_id, "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "all_candidates_exhausted");
        assert_eq!(body["attemptedUrls"], json!([URL]));
        assert_eq!(body["lastError"]["stage"], "scraping");
    }

    #[tokio::test]
    async fn test_generate_unknown_conversation() {
        let app = app_with(scripted());
        let (status, body) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": "missing", "userId": "u1"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_edit_creates_new_record() {
        let llm = scripted().respond(
            LlmTask::FormatRecipe,
            format_output("Kung Pao Tofu", &["1 lb tofu", "1 cup peanuts"]),
        );
        let app = app_with(llm);
        let conversation_id = seed_conversation(&app, "u1");
        let (_, generated) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": conversation_id, "userId": "u1"})),
            )
            .await;
        let original_id = generated["recipe"]["id"].as_i64().unwrap();

        let (status, body) = app
            .send(
                "POST",
                "/api/edit-recipe",
                Some(json!({
                    "conversationId": conversation_id,
                    "userId": "u1",
                    "recipeId": original_id
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["originalRecipeId"], original_id);
        assert_ne!(body["recipe"]["id"], original_id);
        assert_eq!(body["recipe"]["recipeData"]["title"], "Kung Pao Tofu");
        assert_eq!(body["recipe"]["recipeData"]["sourceUrl"], URL);

        let conversation = app
            .state
            .store
            .get_conversation(&conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(conversation.recipe_id, body["recipe"]["id"].as_i64());
    }

    #[tokio::test]
    async fn test_mark_saved() {
        let app = app_with(scripted());
        let conversation_id = seed_conversation(&app, "u1");
        let (_, generated) = app
            .send(
                "POST",
                "/api/generate-recipe",
                Some(json!({"conversationId": conversation_id, "userId": "u1"})),
            )
            .await;
        let id = generated["recipe"]["id"].as_i64().unwrap();

        let (status, body) = app
            .send(
                "PATCH",
                &format!("/api/recipes/{}", id),
                Some(json!({"userId": "u1", "isSaved": true})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isSaved"], true);

        let (status, _) = app
            .send(
                "PATCH",
                &format!("/api/recipes/{}", id),
                Some(json!({"userId": "u2", "isSaved": true})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
