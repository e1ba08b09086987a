//! LLM provider configuration routes. API keys are never returned.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use mise_llm::{LLMConfigResponse, LLMConfigUpdate};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/llm/config", get(get_config).put(update_config))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<LLMConfigResponse> {
    Json(state.llm_config.read().to_response())
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<LLMConfigUpdate>,
) -> Result<Json<LLMConfigResponse>, ApiError> {
    let response = {
        let mut config = state.llm_config.write();
        config.apply_update(&update).map_err(ApiError::validation)?;
        config.save().map_err(|e| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                format!("Failed to save config: {}", e),
            )
        })?;
        config.to_response()
    };
    state.refresh_llm();

    Ok(Json(response))
}
