//! Job kinds of a sync run and their executor

use crate::error::SyncError;
use crate::services::catalog_client::{CatalogApi, TimeRange};
use crate::services::lastfm_client::ScrobbleApi;
use crate::workflow::{CursorPage, JobExecutor};
use async_trait::async_trait;
use relist_common::models::{AlbumDetails, AlbumGroup, Artist, CatalogAlbum, ScrobbleArtist, User};
use std::sync::Arc;

/// One request-sized unit of work
#[derive(Debug, Clone, PartialEq)]
pub enum SyncJob {
    CurrentUser,
    FollowedArtists {
        after: Option<String>,
        limit: u32,
    },
    SavedTracks {
        offset: u32,
        limit: u32,
    },
    SavedAlbums {
        offset: u32,
        limit: u32,
    },
    TopArtists {
        time_range: TimeRange,
        offset: u32,
        limit: u32,
    },
    ArtistAlbums {
        artist_id: String,
        groups: Vec<AlbumGroup>,
        offset: u32,
        limit: u32,
    },
    AlbumDetails {
        ids: Vec<String>,
    },
    /// Listening-history page, 1-based
    ScrobbleTopArtists {
        username: String,
        page: u32,
        limit: u32,
    },
}

/// Typed result of one job
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutput {
    User(User),
    ArtistCursor(CursorPage<Artist>),
    /// Credited artists per saved track or album
    Credits(Vec<Vec<Artist>>),
    Artists(Vec<Artist>),
    Albums(Vec<CatalogAlbum>),
    Details(Vec<AlbumDetails>),
    Scrobbles(Vec<ScrobbleArtist>),
}

impl SyncOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncOutput::User(_) => "user",
            SyncOutput::ArtistCursor(_) => "artist_cursor",
            SyncOutput::Credits(_) => "credits",
            SyncOutput::Artists(_) => "artists",
            SyncOutput::Albums(_) => "albums",
            SyncOutput::Details(_) => "details",
            SyncOutput::Scrobbles(_) => "scrobbles",
        }
    }

    fn unexpected(self, expected: &'static str) -> SyncError {
        SyncError::UnexpectedOutput {
            expected,
            actual: self.kind(),
        }
    }

    pub fn into_user(self) -> Result<User, SyncError> {
        match self {
            SyncOutput::User(user) => Ok(user),
            other => Err(other.unexpected("user")),
        }
    }

    pub fn into_artist_cursor(self) -> Result<CursorPage<Artist>, SyncError> {
        match self {
            SyncOutput::ArtistCursor(page) => Ok(page),
            other => Err(other.unexpected("artist_cursor")),
        }
    }

    pub fn into_credits(self) -> Result<Vec<Vec<Artist>>, SyncError> {
        match self {
            SyncOutput::Credits(credits) => Ok(credits),
            other => Err(other.unexpected("credits")),
        }
    }

    pub fn into_artists(self) -> Result<Vec<Artist>, SyncError> {
        match self {
            SyncOutput::Artists(artists) => Ok(artists),
            other => Err(other.unexpected("artists")),
        }
    }

    pub fn into_albums(self) -> Result<Vec<CatalogAlbum>, SyncError> {
        match self {
            SyncOutput::Albums(albums) => Ok(albums),
            other => Err(other.unexpected("albums")),
        }
    }

    pub fn into_details(self) -> Result<Vec<AlbumDetails>, SyncError> {
        match self {
            SyncOutput::Details(details) => Ok(details),
            other => Err(other.unexpected("details")),
        }
    }

    pub fn into_scrobbles(self) -> Result<Vec<ScrobbleArtist>, SyncError> {
        match self {
            SyncOutput::Scrobbles(scrobbles) => Ok(scrobbles),
            other => Err(other.unexpected("scrobbles")),
        }
    }
}

/// Dispatches [`SyncJob`]s to the API clients with the run's token
pub struct CatalogExecutor {
    catalog: Arc<dyn CatalogApi>,
    scrobble: Option<Arc<dyn ScrobbleApi>>,
    token: String,
}

impl CatalogExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        scrobble: Option<Arc<dyn ScrobbleApi>>,
        token: String,
    ) -> Self {
        Self {
            catalog,
            scrobble,
            token,
        }
    }
}

#[async_trait]
impl JobExecutor for CatalogExecutor {
    type Job = SyncJob;
    type Output = SyncOutput;

    async fn execute(&self, job: SyncJob) -> Result<SyncOutput, SyncError> {
        let token = self.token.as_str();
        let output = match job {
            SyncJob::CurrentUser => SyncOutput::User(self.catalog.current_user(token).await?),
            SyncJob::FollowedArtists { after, limit } => SyncOutput::ArtistCursor(
                self.catalog
                    .followed_artists(token, after.as_deref(), limit)
                    .await?,
            ),
            SyncJob::SavedTracks { offset, limit } => SyncOutput::Credits(
                self.catalog.saved_track_artists(token, offset, limit).await?,
            ),
            SyncJob::SavedAlbums { offset, limit } => SyncOutput::Credits(
                self.catalog.saved_album_artists(token, offset, limit).await?,
            ),
            SyncJob::TopArtists {
                time_range,
                offset,
                limit,
            } => SyncOutput::Artists(
                self.catalog
                    .top_artists(token, time_range, offset, limit)
                    .await?,
            ),
            SyncJob::ArtistAlbums {
                artist_id,
                groups,
                offset,
                limit,
            } => SyncOutput::Albums(
                self.catalog
                    .artist_albums(token, &artist_id, &groups, offset, limit)
                    .await?,
            ),
            SyncJob::AlbumDetails { ids } => {
                SyncOutput::Details(self.catalog.albums(token, &ids).await?)
            }
            SyncJob::ScrobbleTopArtists {
                username,
                page,
                limit,
            } => {
                let scrobble = self.scrobble.as_ref().ok_or_else(|| {
                    SyncError::Internal("listening-history client not configured".to_string())
                })?;
                SyncOutput::Scrobbles(scrobble.top_artists(&username, page, limit).await?)
            }
        };
        Ok(output)
    }
}
