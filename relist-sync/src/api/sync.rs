//! Sync control API handlers
//!
//! POST /sync/start, POST /sync/cancel, POST /sync/animation-finished,
//! GET /sync/status

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    services::RunHandle,
    AppState, SyncError,
};

/// POST /sync/start request
#[derive(Debug, Default, Deserialize)]
pub struct StartSyncRequest {
    /// Started by a schedule rather than the user
    #[serde(default)]
    pub auto: bool,
}

/// POST /sync/start response
#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Response of the run control endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct RunControlResponse {
    pub run_id: Uuid,
    pub message: String,
}

/// GET /sync/status response
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub running: bool,
    pub run_id: Option<Uuid>,
}

/// POST /sync/start
///
/// Begin a sync run in the background. Returns 202 Accepted with the run id;
/// progress arrives over `/events`.
///
/// **Errors:**
/// - 409 Conflict: a run is already active
pub async fn start_sync(
    State(state): State<AppState>,
    request: Option<Json<StartSyncRequest>>,
) -> ApiResult<(StatusCode, Json<StartSyncResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let handle = state
        .begin_run()
        .await
        .ok_or_else(|| ApiError::Conflict("Sync run already in progress".to_string()))?;
    let run_id = handle.run_id();

    tracing::info!(run_id = %run_id, auto = request.auto, "Sync run requested");

    let state_clone = state.clone();
    tokio::spawn(async move {
        match state_clone.execute_run(handle, request.auto).await {
            Ok(payload) => tracing::info!(
                run_id = %run_id,
                albums = payload.albums.len(),
                "Background sync task completed successfully"
            ),
            Err(SyncError::Cancelled) => {
                tracing::info!(run_id = %run_id, "Background sync task cancelled")
            }
            Err(e) => tracing::error!(
                run_id = %run_id,
                error = %e,
                "Background sync task failed"
            ),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse {
            run_id,
            started_at: chrono::Utc::now(),
        }),
    ))
}

/// POST /sync/cancel
///
/// Ends the active run in the cancelled state.
///
/// **Errors:**
/// - 404 Not Found: no active run
pub async fn cancel_sync(State(state): State<AppState>) -> ApiResult<Json<RunControlResponse>> {
    let handle = active_handle(&state).await?;
    handle.cancel();
    tracing::info!(run_id = %handle.run_id(), "Sync cancellation requested");

    Ok(Json(RunControlResponse {
        run_id: handle.run_id(),
        message: "Cancellation requested".to_string(),
    }))
}

/// POST /sync/animation-finished
///
/// Releases the terminal wait after 100% before the grace timeout.
///
/// **Errors:**
/// - 404 Not Found: no active run
pub async fn animation_finished(
    State(state): State<AppState>,
) -> ApiResult<Json<RunControlResponse>> {
    let handle = active_handle(&state).await?;
    handle.finish_animation();

    Ok(Json(RunControlResponse {
        run_id: handle.run_id(),
        message: "Animation finished".to_string(),
    }))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    let run_id = state.active_run.read().await.as_ref().map(RunHandle::run_id);
    Json(SyncStatusResponse {
        running: run_id.is_some(),
        run_id,
    })
}

async fn active_handle(state: &AppState) -> ApiResult<RunHandle> {
    state
        .active_run
        .read()
        .await
        .clone()
        .ok_or_else(|| ApiError::NotFound("No sync run in progress".to_string()))
}

/// Build sync control routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/start", post(start_sync))
        .route("/sync/cancel", post(cancel_sync))
        .route("/sync/animation-finished", post(animation_finished))
        .route("/sync/status", get(sync_status))
}
