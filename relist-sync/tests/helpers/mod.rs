//! Test Helper Utilities
//!
//! In-memory doubles of the catalog and listening-history APIs plus builders
//! for engines and application state.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use relist_common::config::EngineConfig;
use relist_common::events::{EventBus, SyncEvent};
use relist_common::models::{
    AlbumDetails, AlbumGroup, Artist, CatalogAlbum, ReleaseDatePrecision, ScrobbleArtist, User,
};
use relist_common::settings::SyncSettings;
use relist_sync::error::TransportError;
use relist_sync::services::catalog_client::{CatalogApi, TimeRange};
use relist_sync::services::lastfm_client::{ScrobbleApi, ScrobbleConnector};
use relist_sync::services::{MemoryHistoryStore, SharedHistory, StaticTokenAuth, SyncOrchestrator};
use relist_sync::workflow::CursorPage;
use relist_sync::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Catalog double serving fixed data with real paging semantics
#[derive(Default)]
pub struct FakeCatalog {
    pub user: Option<User>,
    pub followed: Vec<Artist>,
    pub saved_tracks: Vec<Vec<Artist>>,
    pub saved_albums: Vec<Vec<Artist>>,
    pub top_medium: Vec<Artist>,
    pub top_long: Vec<Artist>,
    pub discographies: HashMap<String, Vec<CatalogAlbum>>,
    pub details: HashMap<String, AlbumDetails>,
    /// Artists whose discography request fails with HTTP 500
    pub failing_artists: HashSet<String>,
    pub fail_top_artists: bool,
    /// Number of `current_user` calls that fail before one succeeds
    pub user_failures: AtomicU32,
    /// Delay of every discography page
    pub album_delay_ms: u64,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            user: Some(User {
                id: "user-1".to_string(),
                display_name: Some("Test User".to_string()),
                country: Some("SE".to_string()),
                image: None,
            }),
            ..Default::default()
        }
    }

    pub fn with_discography(mut self, artist: &Artist, albums: Vec<CatalogAlbum>) -> Self {
        self.discographies.insert(artist.id.clone(), albums);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn server_error() -> TransportError {
    TransportError::Status {
        status: 500,
        message: "Server error".to_string(),
    }
}

fn page<T: Clone>(items: &[T], offset: u32, limit: u32) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn current_user(&self, _token: &str) -> Result<User, TransportError> {
        self.record("me".to_string());
        let remaining = self.user_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.user_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(server_error());
        }
        self.user.clone().ok_or(TransportError::Status {
            status: 401,
            message: "Invalid access token".to_string(),
        })
    }

    async fn followed_artists(
        &self,
        _token: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<CursorPage<Artist>, TransportError> {
        self.record(format!("following after={:?}", after));
        let start: u32 = after.map(|a| a.parse().unwrap_or(0)).unwrap_or(0);
        let items = page(&self.followed, start, limit);
        let end = start + items.len() as u32;
        let next_cursor = ((end as usize) < self.followed.len()).then(|| end.to_string());
        Ok(CursorPage { items, next_cursor })
    }

    async fn saved_track_artists(
        &self,
        _token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError> {
        Ok(page(&self.saved_tracks, offset, limit))
    }

    async fn saved_album_artists(
        &self,
        _token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError> {
        Ok(page(&self.saved_albums, offset, limit))
    }

    async fn top_artists(
        &self,
        _token: &str,
        time_range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Artist>, TransportError> {
        if self.fail_top_artists {
            return Err(server_error());
        }
        let source = match time_range {
            TimeRange::MediumTerm => &self.top_medium,
            TimeRange::LongTerm => &self.top_long,
        };
        Ok(page(source, offset, limit))
    }

    async fn artist_albums(
        &self,
        _token: &str,
        artist_id: &str,
        groups: &[AlbumGroup],
        offset: u32,
        limit: u32,
    ) -> Result<Vec<CatalogAlbum>, TransportError> {
        self.record(format!("albums artist={} offset={}", artist_id, offset));
        if self.album_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.album_delay_ms)).await;
        }
        if self.failing_artists.contains(artist_id) {
            return Err(server_error());
        }
        let albums: Vec<CatalogAlbum> = self
            .discographies
            .get(artist_id)
            .map(|all| {
                all.iter()
                    .filter(|a| groups.contains(&a.album_group))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(page(&albums, offset, limit))
    }

    async fn albums(&self, _token: &str, ids: &[String]) -> Result<Vec<AlbumDetails>, TransportError> {
        self.record(format!("details count={}", ids.len()));
        Ok(ids.iter().filter_map(|id| self.details.get(id).cloned()).collect())
    }
}

/// Listening-history double paged by 1-based page number
#[derive(Default)]
pub struct FakeScrobble {
    pub artists: Vec<ScrobbleArtist>,
    pub fail: bool,
}

#[async_trait]
impl ScrobbleApi for FakeScrobble {
    async fn top_artists(
        &self,
        _username: &str,
        page_number: u32,
        limit: u32,
    ) -> Result<Vec<ScrobbleArtist>, TransportError> {
        if self.fail {
            return Err(server_error());
        }
        let offset = page_number.saturating_sub(1) * limit;
        Ok(page(&self.artists, offset, limit))
    }
}

/// Hands out one [`FakeScrobble`] and records the keys it was asked for
pub struct FakeConnector {
    pub scrobble: Arc<FakeScrobble>,
    pub keys: Mutex<Vec<String>>,
}

impl FakeConnector {
    pub fn new(scrobble: FakeScrobble) -> Self {
        Self {
            scrobble: Arc::new(scrobble),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

impl ScrobbleConnector for FakeConnector {
    fn connect(&self, api_key: &str) -> Arc<dyn ScrobbleApi> {
        self.keys.lock().unwrap().push(api_key.to_string());
        self.scrobble.clone()
    }
}

pub fn artist(id: &str) -> Artist {
    Artist::new(id, format!("Artist {}", id))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Day-precision album credited to `credits`
pub fn catalog_album(
    id: &str,
    group: AlbumGroup,
    release_date: NaiveDate,
    credits: &[&Artist],
) -> CatalogAlbum {
    CatalogAlbum {
        id: id.to_string(),
        name: format!("Album {}", id),
        album_type: "album".to_string(),
        album_group: group,
        release_date: release_date.format("%Y-%m-%d").to_string(),
        release_date_precision: ReleaseDatePrecision::Day,
        artists: credits.iter().map(|a| (*a).clone()).collect(),
        image: None,
        total_tracks: 10,
    }
}

/// Fast engine tuning for tests
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        worker_count: 4,
        max_attempts: 3,
        retry_base_delay_ms: 10,
        completion_grace_ms: 20,
    }
}

pub fn memory_history(ids: &[&str]) -> SharedHistory {
    Arc::new(tokio::sync::Mutex::new(MemoryHistoryStore::with_ids(
        ids.iter().copied(),
    )))
}

pub fn build_orchestrator(catalog: Arc<FakeCatalog>, history: SharedHistory) -> SyncOrchestrator {
    build_orchestrator_with(
        catalog,
        history,
        StaticTokenAuth::new("test-token"),
        test_engine_config(),
    )
}

pub fn build_orchestrator_with(
    catalog: Arc<FakeCatalog>,
    history: SharedHistory,
    auth: StaticTokenAuth,
    engine: EngineConfig,
) -> SyncOrchestrator {
    SyncOrchestrator::new(catalog, Arc::new(auth), history, EventBus::new(1024), engine)
}

/// Application state over an in-memory database
pub async fn test_app_state(catalog: FakeCatalog, settings: SyncSettings) -> AppState {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    relist_sync::db::init_tables(&db_pool).await.unwrap();

    let orchestrator = build_orchestrator(Arc::new(catalog), memory_history(&[]));
    AppState::new(db_pool, Arc::new(orchestrator), settings)
}

/// Everything currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Progress values in emission order
pub fn progress_values(events: &[SyncEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncProgress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect()
}
