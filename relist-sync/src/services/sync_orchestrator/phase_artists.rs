//! LOAD_USER and LOAD_ARTISTS
//!
//! **Artist harvesting:**
//! - FOLLOWED: every followed artist (cursor-paged)
//! - SAVED_TRACKS: artists credited on at least `minimum_saved_tracks` saved
//!   tracks (offset-paged)
//! - SAVED_ALBUMS: every artist credited on a saved album (offset-paged)
//!
//! The sources are fetched concurrently and unioned by artist id. A failing
//! source is logged and skipped; the stage itself only fails on cancellation.

use super::{next_or_cancelled, RunAttempt, SyncJob, SyncOrchestrator, SyncOutput};
use crate::error::SyncError;
use crate::services::catalog_client::PAGE_LIMIT;
use crate::workflow::{fetch_cursor_paged, fetch_offset_paged, WorkerPool};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use relist_common::events::SyncStage;
use relist_common::models::{Artist, ArtistSource};
use std::collections::{HashMap, HashSet};

use super::jobs::CatalogExecutor;

impl SyncOrchestrator {
    /// Load the authenticated user; any failure is fatal to the attempt
    pub(super) async fn phase_load_user(&self, run: &mut RunAttempt<'_>) -> Result<(), SyncError> {
        let user = run
            .pool
            .submit(SyncJob::CurrentUser)
            .await
            .result?
            .into_user()?;

        tracing::info!(run_id = %run.run_id, user_id = %user.id, "User loaded");
        run.user = Some(user);
        Ok(())
    }

    /// Harvest artists from every configured source
    pub(super) async fn phase_load_artists(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        let mut sources: Vec<ArtistSource> = Vec::new();
        for source in &run.settings.artist_sources {
            if !sources.contains(source) {
                sources.push(*source);
            }
        }
        let total = sources.len();
        let minimum_saved_tracks = run.settings.minimum_saved_tracks;

        let pool = &run.pool;
        let mut fetches: FuturesUnordered<BoxFuture<'_, (ArtistSource, Result<Vec<Artist>, SyncError>)>> =
            sources
                .iter()
                .map(|&source| {
                    async move { (source, fetch_source(pool, source, minimum_saved_tracks).await) }
                        .boxed()
                })
                .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut artists: Vec<Artist> = Vec::new();
        let mut completed = 0;

        while let Some((source, result)) = next_or_cancelled(run.cancel, &mut fetches).await? {
            completed += 1;
            match result {
                Ok(found) => {
                    tracing::debug!(run_id = %run.run_id, source = ?source, count = found.len(), "Artist source loaded");
                    for artist in found {
                        if seen.insert(artist.id.clone()) {
                            artists.push(artist);
                        }
                    }
                }
                Err(e) => {
                    run.skipped_items += 1;
                    tracing::warn!(
                        run_id = %run.run_id,
                        source = ?source,
                        error = %e,
                        "Artist source failed, continuing without it"
                    );
                }
            }
            run.tracker.item_completed(SyncStage::LoadArtists, completed, total);
        }
        drop(fetches);

        tracing::info!(run_id = %run.run_id, artists = artists.len(), "Artists harvested");
        run.artists = artists;
        Ok(())
    }
}

async fn fetch_source(
    pool: &WorkerPool<CatalogExecutor>,
    source: ArtistSource,
    minimum_saved_tracks: u32,
) -> Result<Vec<Artist>, SyncError> {
    match source {
        ArtistSource::Followed => {
            fetch_cursor_paged(
                pool,
                |after| SyncJob::FollowedArtists {
                    after,
                    limit: PAGE_LIMIT,
                },
                SyncOutput::into_artist_cursor,
            )
            .await
        }
        ArtistSource::SavedTracks => {
            let credits = fetch_offset_paged(
                pool,
                PAGE_LIMIT,
                None,
                |offset, limit| SyncJob::SavedTracks { offset, limit },
                SyncOutput::into_credits,
            )
            .await?;
            Ok(harvest_credited_artists(credits, minimum_saved_tracks))
        }
        ArtistSource::SavedAlbums => {
            let credits = fetch_offset_paged(
                pool,
                PAGE_LIMIT,
                None,
                |offset, limit| SyncJob::SavedAlbums { offset, limit },
                SyncOutput::into_credits,
            )
            .await?;
            Ok(harvest_credited_artists(credits, 1))
        }
    }
}

/// Artists credited on at least `minimum` of the given credit lists
///
/// An artist counts once per list. First-seen order is kept.
pub fn harvest_credited_artists(credits: Vec<Vec<Artist>>, minimum: u32) -> Vec<Artist> {
    let minimum = minimum.max(1);
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut order: Vec<Artist> = Vec::new();

    for track in credits {
        let mut on_track = HashSet::new();
        for artist in track {
            if !on_track.insert(artist.id.clone()) {
                continue;
            }
            let count = counts.entry(artist.id.clone()).or_insert(0);
            if *count == 0 {
                order.push(artist);
            }
            *count += 1;
        }
    }

    order
        .into_iter()
        .filter(|artist| counts.get(&artist.id).copied().unwrap_or(0) >= minimum)
        .collect()
}
