//! Dietary profile routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use mise_core::DietaryProfile;
use mise_store::ProfileStore;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/profiles/{user_id}", get(get_profile).put(put_profile))
}

/// GET /api/profiles/{userId}
async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<DietaryProfile>, ApiError> {
    state
        .store
        .get_profile(&user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("profile for {}", user_id)))
}

/// PUT /api/profiles/{userId}. Replaces the whole profile.
async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(profile): Json<DietaryProfile>,
) -> Result<Json<DietaryProfile>, ApiError> {
    if user_id.trim().is_empty() {
        return Err(ApiError::validation("userId is required"));
    }
    state.store.upsert_profile(&user_id, &profile)?;
    info!(
        "Updated profile for {}: {} allergens, {} restrictions",
        user_id,
        profile.allergens.len(),
        profile.restrictions.len()
    );
    Ok(Json(profile))
}
