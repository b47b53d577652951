//! Sync settings API endpoint
//!
//! GET/PUT /settings/sync. A stored snapshot applies from the next run on;
//! a run in progress keeps the snapshot it started with.

use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::get, Json, Router};
use relist_common::settings::SyncSettings;
use tracing::info;

/// GET /settings/sync
pub async fn get_sync_settings(State(state): State<AppState>) -> Json<SyncSettings> {
    Json(state.settings.read().await.clone())
}

/// PUT /settings/sync
///
/// **Behavior:**
/// 1. Validate the snapshot
/// 2. Write to database (authoritative)
/// 3. Replace the in-memory snapshot
///
/// **Errors:**
/// - 400 Bad Request: snapshot fails validation
/// - 500 Internal Server Error: database write failure
pub async fn put_sync_settings(
    State(state): State<AppState>,
    Json(settings): Json<SyncSettings>,
) -> ApiResult<Json<SyncSettings>> {
    settings
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    crate::db::settings::set_sync_settings(&state.db, &settings)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save sync settings: {}", e)))?;

    *state.settings.write().await = settings.clone();
    info!("Sync settings updated via API");

    Ok(Json(settings))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/settings/sync", get(get_sync_settings).put(put_sync_settings))
}
