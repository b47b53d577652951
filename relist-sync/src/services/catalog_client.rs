//! Music catalog Web API client
//!
//! Thin, typed wrapper over the rate-limit-aware [`Transport`]. Each method is
//! one request; pagination is driven by the caller through the worker pool.
//!
//! **Endpoints:**
//! - `GET /me`
//! - `GET /me/following?type=artist` (cursor-paged)
//! - `GET /me/tracks`, `GET /me/albums` (offset-paged)
//! - `GET /me/top/artists` (offset-paged, per time range)
//! - `GET /artists/{id}/albums` (offset-paged)
//! - `GET /albums?ids=` (batch lookup)

use crate::error::TransportError;
use crate::services::transport::{Method, Transport};
use crate::workflow::CursorPage;
use async_trait::async_trait;
use relist_common::models::{
    AlbumDetails, AlbumGroup, Artist, CatalogAlbum, ReleaseDatePrecision, User,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Catalog Web API base URL
pub const CATALOG_BASE_URL: &str = "https://api.spotify.com/v1";

/// Page size used for every paged catalog endpoint
pub const PAGE_LIMIT: u32 = 50;

/// Most ids accepted by one batch album lookup
pub const ALBUM_BATCH_SIZE: usize = 20;

/// Ranking window of the user's top artists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeRange {
    /// Roughly the last six months
    MediumTerm,
    /// Several years
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

/// Catalog operations used by the sync engine
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<User, TransportError>;

    async fn followed_artists(
        &self,
        token: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<CursorPage<Artist>, TransportError>;

    /// Credited artists of each saved track on one page
    async fn saved_track_artists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError>;

    /// Credited artists of each saved album on one page
    async fn saved_album_artists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError>;

    async fn top_artists(
        &self,
        token: &str,
        time_range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Artist>, TransportError>;

    async fn artist_albums(
        &self,
        token: &str,
        artist_id: &str,
        groups: &[AlbumGroup],
        offset: u32,
        limit: u32,
    ) -> Result<Vec<CatalogAlbum>, TransportError>;

    /// Extended data for at most [`ALBUM_BATCH_SIZE`] albums
    async fn albums(&self, token: &str, ids: &[String])
        -> Result<Vec<AlbumDetails>, TransportError>;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ImageDto {
    url: String,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    display_name: Option<String>,
    country: Option<String>,
    #[serde(default)]
    images: Vec<ImageDto>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArtistDto {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CursorPaging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    cursors: Option<Cursors>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FollowingDto {
    artists: CursorPaging<ArtistDto>,
}

#[derive(Debug, Deserialize)]
struct TrackDto {
    #[serde(default)]
    artists: Vec<ArtistDto>,
}

#[derive(Debug, Deserialize)]
struct SavedTrackDto {
    track: Option<TrackDto>,
}

#[derive(Debug, Deserialize)]
struct SavedAlbumDto {
    album: Option<TrackDto>,
}

#[derive(Debug, Deserialize)]
struct AlbumDto {
    id: String,
    name: String,
    #[serde(default)]
    album_type: String,
    album_group: Option<String>,
    release_date: String,
    release_date_precision: Option<ReleaseDatePrecision>,
    #[serde(default)]
    artists: Vec<ArtistDto>,
    #[serde(default)]
    images: Vec<ImageDto>,
    #[serde(default)]
    total_tracks: u32,
}

#[derive(Debug, Deserialize)]
struct FullAlbumDto {
    id: String,
    label: Option<String>,
    popularity: Option<u32>,
    #[serde(default)]
    total_tracks: u32,
}

#[derive(Debug, Deserialize)]
struct AlbumsDto {
    #[serde(default)]
    albums: Vec<Option<FullAlbumDto>>,
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Parse(e.to_string()))
}

/// Artists without an id (local files) cannot be followed up on
fn to_artists(dtos: Vec<ArtistDto>) -> Vec<Artist> {
    dtos.into_iter()
        .filter_map(|dto| dto.id.map(|id| Artist::new(id, dto.name)))
        .collect()
}

fn to_catalog_album(dto: AlbumDto, fallback_group: AlbumGroup) -> CatalogAlbum {
    let album_group = dto
        .album_group
        .as_deref()
        .and_then(AlbumGroup::parse)
        .unwrap_or(fallback_group);

    CatalogAlbum {
        id: dto.id,
        name: dto.name,
        album_type: dto.album_type,
        album_group,
        release_date: dto.release_date,
        release_date_precision: dto.release_date_precision.unwrap_or(ReleaseDatePrecision::Day),
        artists: to_artists(dto.artists),
        image: dto.images.into_iter().next().map(|i| i.url),
        total_tracks: dto.total_tracks,
    }
}

// ============================================================================
// Client
// ============================================================================

/// Catalog client over any [`Transport`]
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
}

impl CatalogClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, token: &str) -> Result<T, TransportError> {
        let value = self.transport.request(endpoint, Method::Get, token, None).await?;
        parse(value)
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn current_user(&self, token: &str) -> Result<User, TransportError> {
        let dto: UserDto = self.get("me", token).await?;
        Ok(User {
            id: dto.id,
            display_name: dto.display_name,
            country: dto.country,
            image: dto.images.into_iter().next().map(|i| i.url),
        })
    }

    async fn followed_artists(
        &self,
        token: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<CursorPage<Artist>, TransportError> {
        let mut endpoint = format!("me/following?type=artist&limit={}", limit);
        if let Some(after) = after {
            endpoint.push_str("&after=");
            endpoint.push_str(after);
        }

        let dto: FollowingDto = self.get(&endpoint, token).await?;
        let page = dto.artists;
        // `next` is null on the last page even when a cursor is present
        let next_cursor = page
            .next
            .and(page.cursors.and_then(|c| c.after));

        Ok(CursorPage {
            items: to_artists(page.items),
            next_cursor,
        })
    }

    async fn saved_track_artists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError> {
        let endpoint = format!("me/tracks?limit={}&offset={}", limit, offset);
        let page: Paging<SavedTrackDto> = self.get(&endpoint, token).await?;
        Ok(page
            .items
            .into_iter()
            .map(|item| item.track.map(|t| to_artists(t.artists)).unwrap_or_default())
            .collect())
    }

    async fn saved_album_artists(
        &self,
        token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Vec<Artist>>, TransportError> {
        let endpoint = format!("me/albums?limit={}&offset={}", limit, offset);
        let page: Paging<SavedAlbumDto> = self.get(&endpoint, token).await?;
        Ok(page
            .items
            .into_iter()
            .map(|item| item.album.map(|a| to_artists(a.artists)).unwrap_or_default())
            .collect())
    }

    async fn top_artists(
        &self,
        token: &str,
        time_range: TimeRange,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Artist>, TransportError> {
        let endpoint = format!(
            "me/top/artists?time_range={}&limit={}&offset={}",
            time_range.as_str(),
            limit,
            offset
        );
        let page: Paging<ArtistDto> = self.get(&endpoint, token).await?;
        Ok(to_artists(page.items))
    }

    async fn artist_albums(
        &self,
        token: &str,
        artist_id: &str,
        groups: &[AlbumGroup],
        offset: u32,
        limit: u32,
    ) -> Result<Vec<CatalogAlbum>, TransportError> {
        let include_groups = groups
            .iter()
            .map(|g| g.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let endpoint = format!(
            "artists/{}/albums?include_groups={}&market=from_token&limit={}&offset={}",
            artist_id, include_groups, limit, offset
        );
        let page: Paging<AlbumDto> = self.get(&endpoint, token).await?;
        let fallback = groups.first().copied().unwrap_or(AlbumGroup::Album);
        Ok(page
            .items
            .into_iter()
            .map(|dto| to_catalog_album(dto, fallback))
            .collect())
    }

    async fn albums(
        &self,
        token: &str,
        ids: &[String],
    ) -> Result<Vec<AlbumDetails>, TransportError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("albums?ids={}", ids.join(","));
        let dto: AlbumsDto = self.get(&endpoint, token).await?;
        Ok(dto
            .albums
            .into_iter()
            .flatten()
            .map(|album| AlbumDetails {
                id: album.id,
                label: album.label,
                popularity: album.popularity,
                total_tracks: album.total_tracks,
            })
            .collect())
    }
}
