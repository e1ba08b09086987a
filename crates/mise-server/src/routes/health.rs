//! Liveness route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::warn;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// GET /api/health
async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let recipes = match state.store.count_recipes() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Health check could not count recipes: {}", e);
            None
        }
    };
    let llm_model = state.llm().map(|llm| llm.model().to_string());

    Json(serde_json::json!({
        "status": if recipes.is_some() { "ok" } else { "degraded" },
        "llmConfigured": llm_model.is_some(),
        "llmModel": llm_model,
        "recipes": recipes,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
