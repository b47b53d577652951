//! Sync orchestrator
//!
//! Drives one sync run through its stages on a fresh worker pool per attempt.
//!
//! # Stage Progression
//! INIT → LOAD_USER → LOAD_ARTISTS → [LOAD_TOP_ARTISTS] → [LOAD_LISTENING_HISTORY]
//! → LOAD_BASE_CATALOG_DATA → MERGE_AND_FILTER → [LOAD_EXTENDED_CATALOG_DATA]
//! → [COMPUTE_AFFINITY] → [UPDATE_HISTORY_TRACKING] → FINALIZE
//!
//! Bracketed stages run only when the settings enable them. Each stage lives in
//! a `phase_*` module as a method of [`SyncOrchestrator`].
//!
//! # Failure Model
//! - Per-item failures inside a fan-out stage are logged and skipped.
//! - Optional-feature failures (top artists, listening history) degrade to
//!   empty signals.
//! - Setup failures (token, user) and anything unexpected end the attempt;
//!   the pool is cancelled and the error goes to the retry wrapper, which
//!   alone decides between another attempt and a user-visible failure.

mod jobs;
mod phase_affinity;
mod phase_artists;
mod phase_catalog;
mod phase_history;
pub mod retry;
pub mod stages;

pub use jobs::{CatalogExecutor, SyncJob, SyncOutput};
pub use phase_artists::harvest_credited_artists;
pub use retry::{run_with_retry, RetryPolicy};
pub use stages::{ProgressTracker, StageBand, StagePlan};

use crate::error::SyncError;
use crate::services::affinity_calculator::AffinityInputs;
use crate::services::album_merger::{DateWindow, MergedAlbum};
use crate::services::auth::{sync_scopes, AuthProvider};
use crate::services::catalog_client::CatalogApi;
use crate::services::history_store::HistoryStore;
use crate::services::lastfm_client::{ScrobbleApi, ScrobbleConnector};
use crate::workflow::WorkerPool;
use chrono::NaiveDate;
use futures::stream::{Stream, StreamExt};
use relist_common::config::EngineConfig;
use relist_common::events::{EventBus, SyncEvent, SyncFinishedPayload, SyncStage};
use relist_common::models::{Album, Artist, User};
use relist_common::settings::SyncSettings;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared, lockable history store
pub type SharedHistory = Arc<Mutex<dyn HistoryStore>>;

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Settings snapshot; never re-read during the run
    pub settings: SyncSettings,
    /// Started by a schedule rather than the user
    pub auto: bool,
    pub previous_sync_max_date: Option<NaiveDate>,
    /// Run start date the date window is anchored on
    pub today: NaiveDate,
}

impl RunRequest {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            auto: false,
            previous_sync_max_date: None,
            today: chrono::Local::now().date_naive(),
        }
    }
}

/// External control of one run
///
/// `cancel` ends the run in the cancelled state; `finish_animation` releases
/// the terminal wait after 100% early.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: Uuid,
    cancel: CancellationToken,
    animation_finished: CancellationToken,
}

impl Default for RunHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunHandle {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            animation_finished: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn finish_animation(&self) {
        self.animation_finished.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// State of one attempt, owned by the single orchestrator control flow
pub(crate) struct RunAttempt<'a> {
    run_id: Uuid,
    settings: &'a SyncSettings,
    window: DateWindow,
    cancel: &'a CancellationToken,
    pool: WorkerPool<CatalogExecutor>,
    tracker: ProgressTracker,
    user: Option<User>,
    artists: Vec<Artist>,
    affinity_inputs: AffinityInputs,
    merged: HashMap<String, MergedAlbum>,
    albums: HashMap<String, Album>,
    album_order: Vec<String>,
    new_album_ids: Vec<String>,
    /// Ids to add to the history store when the attempt completes
    history_pending: Option<HashSet<String>>,
    /// A listening-history client serves this attempt
    scrobble_available: bool,
    /// Fan-out items skipped after a failure
    skipped_items: usize,
}

impl RunAttempt<'_> {
    fn ensure_active(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }
}

/// Next item of `stream`, or `Cancelled` once the run is cancelled
pub(crate) async fn next_or_cancelled<S>(
    cancel: &CancellationToken,
    stream: &mut S,
) -> Result<Option<S::Item>, SyncError>
where
    S: Stream + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        item = stream.next() => Ok(item),
    }
}

/// Sync engine entry point
pub struct SyncOrchestrator {
    catalog: Arc<dyn CatalogApi>,
    scrobble: Option<Arc<dyn ScrobbleApi>>,
    scrobble_connector: Option<Arc<dyn ScrobbleConnector>>,
    auth: Arc<dyn AuthProvider>,
    history: SharedHistory,
    event_bus: EventBus,
    engine: EngineConfig,
}

impl SyncOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        auth: Arc<dyn AuthProvider>,
        history: SharedHistory,
        event_bus: EventBus,
        engine: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            scrobble: None,
            scrobble_connector: None,
            auth,
            history,
            event_bus,
            engine,
        }
    }

    /// Attach a fixed listening-history client
    ///
    /// Used when the run's snapshot carries no API key.
    pub fn with_scrobble(mut self, scrobble: Arc<dyn ScrobbleApi>) -> Self {
        self.scrobble = Some(scrobble);
        self
    }

    /// Build the listening-history client per attempt from the snapshot key
    pub fn with_scrobble_connector(mut self, connector: Arc<dyn ScrobbleConnector>) -> Self {
        self.scrobble_connector = Some(connector);
        self
    }

    fn scrobble_for(&self, settings: &SyncSettings) -> Option<Arc<dyn ScrobbleApi>> {
        let key = settings
            .lastfm_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        match (key, &self.scrobble_connector) {
            (Some(key), Some(connector)) => Some(connector.connect(key)),
            _ => self.scrobble.clone(),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run the full pipeline with the outer retry wrapper
    ///
    /// Emits `SyncFinished` on success; the wrapper emits exactly one
    /// `SyncFailed` or `SyncCancelled` otherwise.
    pub async fn run(
        &self,
        request: RunRequest,
        handle: &RunHandle,
    ) -> Result<SyncFinishedPayload, SyncError> {
        let run_id = handle.run_id();

        if let Err(e) = self.authorize(&request.settings).await {
            tracing::error!(run_id = %run_id, error = %e, "Sync not authorized");
            self.event_bus.emit_lossy(SyncEvent::SyncFailed {
                run_id,
                message: e.to_string(),
                attempts: 0,
                timestamp: chrono::Utc::now(),
            });
            return Err(e);
        }

        let policy = RetryPolicy::from(&self.engine);
        let payload = run_with_retry(&policy, run_id, &self.event_bus, handle.cancel_token(), |attempt| {
            self.run_attempt(&request, handle, attempt)
        })
        .await?;

        tracing::info!(
            run_id = %run_id,
            albums = payload.albums.len(),
            new_albums = payload.new_album_ids.len(),
            "Sync finished"
        );
        self.event_bus.emit_lossy(SyncEvent::SyncFinished {
            run_id,
            payload: Box::new(payload.clone()),
            timestamp: chrono::Utc::now(),
        });
        Ok(payload)
    }

    /// Validate the snapshot and run the authorization gate
    async fn authorize(&self, settings: &SyncSettings) -> Result<(), SyncError> {
        settings
            .validate()
            .map_err(|e| SyncError::InvalidSettings(e.to_string()))?;
        let scopes = sync_scopes(&settings.artist_sources, settings.enable_smart_sort);
        self.auth.authorize("sync", &scopes).await
    }

    /// One independent attempt: new pool, progress from 0
    async fn run_attempt(
        &self,
        request: &RunRequest,
        handle: &RunHandle,
        attempt: u32,
    ) -> Result<SyncFinishedPayload, SyncError> {
        let run_id = handle.run_id();
        let settings = &request.settings;

        self.event_bus.emit_lossy(SyncEvent::SyncStarted {
            run_id,
            attempt,
            auto: request.auto,
            timestamp: chrono::Utc::now(),
        });
        tracing::info!(run_id = %run_id, attempt, "Sync attempt started");

        let token = self.auth.get_auth_data().await?.token;
        let scrobble = self.scrobble_for(settings);
        let scrobble_available = scrobble.is_some();
        let executor = Arc::new(CatalogExecutor::new(
            Arc::clone(&self.catalog),
            scrobble,
            token,
        ));
        let plan = StagePlan::from_settings(settings);

        let mut run = RunAttempt {
            run_id,
            settings,
            window: DateWindow::for_run(request.today, settings.days),
            cancel: handle.cancel_token(),
            pool: WorkerPool::new(self.engine.worker_count, executor),
            tracker: ProgressTracker::new(run_id, self.event_bus.clone(), plan),
            user: None,
            artists: Vec::new(),
            affinity_inputs: AffinityInputs::default(),
            merged: HashMap::new(),
            albums: HashMap::new(),
            album_order: Vec::new(),
            new_album_ids: Vec::new(),
            history_pending: None,
            scrobble_available,
            skipped_items: 0,
        };

        let result = self.run_stages(&mut run).await;
        run.pool.shutdown().await;

        if let Err(e) = result {
            tracing::warn!(run_id = %run_id, attempt, error = %e, "Sync attempt failed");
            return Err(e);
        }

        run.tracker.complete();
        self.await_terminal_signal(handle).await?;

        if let Some(synced) = run.history_pending.take() {
            self.commit_history(run_id, synced).await;
        }

        if run.skipped_items > 0 {
            tracing::warn!(run_id = %run_id, skipped = run.skipped_items, "Sync completed with skipped items");
        }

        let user = run
            .user
            .ok_or_else(|| SyncError::Internal("user not loaded".to_string()))?;

        Ok(SyncFinishedPayload {
            albums: run.albums,
            user,
            previous_sync_max_date: request.previous_sync_max_date,
            sync_max_date: run.window.max_date,
            auto: request.auto,
            album_order: run.album_order,
            new_album_ids: run.new_album_ids,
        })
    }

    async fn run_stages(&self, run: &mut RunAttempt<'_>) -> Result<(), SyncError> {
        let stages: Vec<SyncStage> = run.tracker.plan().stages().collect();

        for stage in stages {
            run.ensure_active()?;
            run.tracker.start_stage(stage);

            match stage {
                SyncStage::Init => self.phase_init(run),
                SyncStage::LoadUser => self.phase_load_user(run).await?,
                SyncStage::LoadArtists => self.phase_load_artists(run).await?,
                SyncStage::LoadTopArtists => self.phase_load_top_artists(run).await?,
                SyncStage::LoadListeningHistory => self.phase_load_listening_history(run).await?,
                SyncStage::LoadBaseCatalogData => self.phase_load_base_catalog(run).await?,
                SyncStage::MergeAndFilter => self.phase_merge_and_filter(run),
                SyncStage::LoadExtendedCatalogData => self.phase_load_extended_catalog(run).await?,
                SyncStage::ComputeAffinity => self.phase_compute_affinity(run),
                SyncStage::UpdateHistoryTracking => self.phase_update_history(run).await?,
                SyncStage::Finalize => self.phase_finalize(run),
            }

            run.tracker.finish_stage(stage);
        }

        Ok(())
    }

    fn phase_init(&self, run: &mut RunAttempt<'_>) {
        tracing::debug!(
            run_id = %run.run_id,
            min_date = %run.window.min_date,
            max_date = %run.window.max_date,
            stages = ?run.tracker.plan().stages().map(|s| s.name()).collect::<Vec<_>>(),
            "Run planned"
        );
    }

    /// Wait for the presentation's animation signal or the grace timeout
    ///
    /// A cancel in the meantime ends the attempt as `Cancelled`.
    async fn await_terminal_signal(&self, handle: &RunHandle) -> Result<(), SyncError> {
        let grace = Duration::from_millis(self.engine.completion_grace_ms);
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return Err(SyncError::Cancelled),
            _ = handle.animation_finished.cancelled() => {
                tracing::debug!(run_id = %handle.run_id, "Animation finished signal received");
            }
            _ = tokio::time::sleep(grace) => {}
        }
        Ok(())
    }
}
