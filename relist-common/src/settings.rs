//! Sync settings snapshot
//!
//! Read-only to the sync engine: a run takes one snapshot at start and never
//! observes later edits. Loaded from the `[sync]` table of the TOML config or
//! from the `sync_settings` row of the settings table.

use crate::models::{AlbumGroup, ArtistSource};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Smart-sort weight at or above which affinity becomes the primary sort key
pub const SMART_SORT_PRIMARY_THRESHOLD: u8 = 50;

/// User-facing sync options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Where artists are discovered
    pub artist_sources: Vec<ArtistSource>,
    /// Minimum saved tracks crediting an artist before SAVED_TRACKS includes it
    pub minimum_saved_tracks: u32,
    /// Lookback window in days
    pub days: u32,
    /// Album groups requested per artist
    pub groups: Vec<AlbumGroup>,
    /// Fetch label/popularity/track count for every album
    pub full_album_data: bool,
    /// Remember synced albums and report the new ones
    pub track_history: bool,
    /// Compute affinity scores
    pub enable_smart_sort: bool,
    /// 0-100, how strongly affinity dominates release date when sorting
    pub smart_sort_weight: u8,
    pub lastfm_enabled: bool,
    pub lastfm_api_key: Option<String>,
    pub lastfm_username: Option<String>,
    pub lastfm_sync_enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            artist_sources: vec![ArtistSource::Followed],
            minimum_saved_tracks: 1,
            days: 30,
            groups: vec![AlbumGroup::Album, AlbumGroup::Single],
            full_album_data: false,
            track_history: false,
            enable_smart_sort: false,
            smart_sort_weight: SMART_SORT_PRIMARY_THRESHOLD,
            lastfm_enabled: false,
            lastfm_api_key: None,
            lastfm_username: None,
            lastfm_sync_enabled: false,
        }
    }
}

impl SyncSettings {
    /// Reject snapshots the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.artist_sources.is_empty() {
            return Err(Error::InvalidInput(
                "at least one artist source is required".to_string(),
            ));
        }
        if self.groups.is_empty() {
            return Err(Error::InvalidInput(
                "at least one album group is required".to_string(),
            ));
        }
        if self.days == 0 {
            return Err(Error::InvalidInput("days must be at least 1".to_string()));
        }
        if self.smart_sort_weight > 100 {
            return Err(Error::InvalidInput(format!(
                "smart_sort_weight must be 0-100, got {}",
                self.smart_sort_weight
            )));
        }
        Ok(())
    }

    /// Whether the listening-history service takes part in the run
    pub fn listening_history_enabled(&self) -> bool {
        self.enable_smart_sort
            && self.lastfm_enabled
            && self.lastfm_sync_enabled
            && has_text(&self.lastfm_api_key)
            && has_text(&self.lastfm_username)
    }

    /// Whether affinity is the primary sort key
    pub fn affinity_is_primary(&self) -> bool {
        self.smart_sort_weight >= SMART_SORT_PRIMARY_THRESHOLD
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
