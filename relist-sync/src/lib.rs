//! relist-sync library interface
//!
//! Exposes the sync engine and the HTTP surface for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, SyncError};

use axum::Router;
use chrono::{DateTime, Utc};
use relist_common::events::{EventBus, SyncFinishedPayload};
use relist_common::settings::SyncSettings;
use services::{RunHandle, RunRequest, SyncOrchestrator};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting; the orchestrator's progress sink
    pub event_bus: EventBus,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Settings snapshot handed to the next run
    pub settings: Arc<RwLock<SyncSettings>>,
    /// Handle of the run in progress, if any
    pub active_run: Arc<RwLock<Option<RunHandle>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, orchestrator: Arc<SyncOrchestrator>, settings: SyncSettings) -> Self {
        Self {
            db,
            event_bus: orchestrator.event_bus().clone(),
            orchestrator,
            settings: Arc::new(RwLock::new(settings)),
            active_run: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a new run; `None` while another run is active
    pub async fn begin_run(&self) -> Option<RunHandle> {
        let mut active = self.active_run.write().await;
        if active.is_some() {
            return None;
        }
        let handle = RunHandle::new();
        *active = Some(handle.clone());
        Some(handle)
    }

    /// Run to completion with the current settings snapshot
    ///
    /// Reads the previous max date before the run and stores the new one after
    /// a success. Always releases the active-run slot held by `handle`.
    pub async fn execute_run(
        &self,
        handle: RunHandle,
        auto: bool,
    ) -> Result<SyncFinishedPayload, SyncError> {
        let run_id = handle.run_id();

        let previous_sync_max_date = match db::settings::get_previous_sync_max_date(&self.db).await
        {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Previous max date unavailable");
                None
            }
        };

        let mut request = RunRequest::new(self.settings.read().await.clone());
        request.auto = auto;
        request.previous_sync_max_date = previous_sync_max_date;

        let result = self.orchestrator.run(request, &handle).await;

        match &result {
            Ok(payload) => {
                if let Err(e) =
                    db::settings::set_previous_sync_max_date(&self.db, payload.sync_max_date).await
                {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to store sync max date");
                }
                *self.last_error.write().await = None;
            }
            Err(SyncError::Cancelled) => {}
            Err(e) => {
                *self.last_error.write().await = Some(e.to_string());
            }
        }

        let mut active = self.active_run.write().await;
        if active.as_ref().is_some_and(|h| h.run_id() == run_id) {
            *active = None;
        }

        result
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::sync_routes())
        .merge(api::settings_routes())
        .merge(api::event_routes())
        .merge(api::health_routes())
        .with_state(state)
}
