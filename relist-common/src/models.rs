//! Catalog domain models
//!
//! Types shared between the sync engine, its events and any consumer of the
//! finished album map. Wire DTOs of the individual APIs live with their clients;
//! these are the engine-facing shapes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Authenticated catalog user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Catalog user id
    pub id: String,
    /// Display name, if the user set one
    pub display_name: Option<String>,
    /// ISO country code of the account
    pub country: Option<String>,
    /// Profile image URL
    pub image: Option<String>,
}

/// Catalog artist reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Where the sync engine discovers the artists it follows releases for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtistSource {
    /// Artists the user follows
    Followed,
    /// Artists credited on the user's saved tracks
    SavedTracks,
    /// Artists credited on the user's saved albums
    SavedAlbums,
}

/// Role under which an artist relates to an album
///
/// Declaration order is the role priority: canonical albums list their role
/// groups in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumGroup {
    Album,
    Single,
    Compilation,
    AppearsOn,
}

impl AlbumGroup {
    /// Value used by the catalog API (`include_groups`, `album_group`)
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumGroup::Album => "album",
            AlbumGroup::Single => "single",
            AlbumGroup::Compilation => "compilation",
            AlbumGroup::AppearsOn => "appears_on",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "album" => Some(AlbumGroup::Album),
            "single" => Some(AlbumGroup::Single),
            "compilation" => Some(AlbumGroup::Compilation),
            "appears_on" => Some(AlbumGroup::AppearsOn),
            _ => None,
        }
    }
}

/// Granularity of a catalog release date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseDatePrecision {
    Year,
    Month,
    Day,
}

/// Album as returned by a single artist-albums page
///
/// `album_group` is the role of the artist whose discography produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAlbum {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub album_group: AlbumGroup,
    /// Raw release date string (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`)
    pub release_date: String,
    pub release_date_precision: ReleaseDatePrecision,
    /// Credited artists (contributors of record)
    pub artists: Vec<Artist>,
    pub image: Option<String>,
    pub total_tracks: u32,
}

/// Extended album data from the batch album lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumDetails {
    pub id: String,
    pub label: Option<String>,
    pub popularity: Option<u32>,
    pub total_tracks: u32,
}

/// Deduplicated, role-attributed album
///
/// Invariant: an artist listed under any role never appears in `other_artists`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub release_date: NaiveDate,
    pub release_date_precision: ReleaseDatePrecision,
    pub image: Option<String>,
    pub total_tracks: u32,
    /// Role → artists, roles in priority order, artists sorted by name
    pub artists: BTreeMap<AlbumGroup, Vec<Artist>>,
    /// Credited artists not captured by any role
    pub other_artists: Vec<Artist>,
    pub label: Option<String>,
    pub popularity: Option<u32>,
    /// Aggregate affinity score (0-100), present when smart sort ran
    pub affinity: Option<f64>,
    /// Bucket of `affinity`
    #[serde(default)]
    pub affinity_category: Option<AffinityCategory>,
}

impl Album {
    /// Every artist on the album: role artists first, then other artists
    pub fn all_artists(&self) -> impl Iterator<Item = &Artist> {
        self.artists
            .values()
            .flat_map(|artists| artists.iter())
            .chain(self.other_artists.iter())
    }
}

/// Consumer-facing affinity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityCategory {
    High,
    Medium,
    Low,
    None,
}

impl AffinityCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            AffinityCategory::High
        } else if score >= 40.0 {
            AffinityCategory::Medium
        } else if score >= 10.0 {
            AffinityCategory::Low
        } else {
            AffinityCategory::None
        }
    }
}

/// Artist entry from the listening-history (scrobble) service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrobbleArtist {
    pub name: String,
    pub playcount: u64,
    /// 1-based rank in the user's top list
    pub rank: u32,
}
