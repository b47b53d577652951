//! LOAD_BASE_CATALOG_DATA, MERGE_AND_FILTER and LOAD_EXTENDED_CATALOG_DATA
//!
//! Base catalog data fans out one offset-paged fetch per harvested artist.
//! Every page is folded into the merged map on the orchestrator side as soon as
//! its artist completes; workers never touch the map.

use super::{next_or_cancelled, RunAttempt, SyncJob, SyncOrchestrator, SyncOutput};
use crate::error::SyncError;
use crate::services::album_merger::{apply_details, filter_and_canonicalize, merge_album, RawAlbum};
use crate::services::catalog_client::{ALBUM_BATCH_SIZE, PAGE_LIMIT};
use crate::workflow::fetch_offset_paged;
use futures::stream::FuturesUnordered;
use relist_common::events::SyncStage;

impl SyncOrchestrator {
    /// Discography of every harvested artist, merged by album id
    pub(super) async fn phase_load_base_catalog(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        let settings = run.settings;
        let pool = &run.pool;
        let artists = &run.artists;
        let total = artists.len();

        let mut fetches: FuturesUnordered<_> = artists
            .iter()
            .map(|artist| async move {
                let result = fetch_offset_paged(
                    pool,
                    PAGE_LIMIT,
                    None,
                    |offset, limit| SyncJob::ArtistAlbums {
                        artist_id: artist.id.clone(),
                        groups: settings.groups.clone(),
                        offset,
                        limit,
                    },
                    SyncOutput::into_albums,
                )
                .await;
                (artist, result)
            })
            .collect();

        let mut merged = std::mem::take(&mut run.merged);
        let mut completed = 0;

        while let Some((artist, result)) = next_or_cancelled(run.cancel, &mut fetches).await? {
            completed += 1;
            match result {
                Ok(albums) => {
                    tracing::debug!(
                        run_id = %run.run_id,
                        artist_id = %artist.id,
                        albums = albums.len(),
                        "Artist albums loaded"
                    );
                    for album in albums {
                        merged = merge_album(merged, RawAlbum::new(album, artist.clone()));
                    }
                }
                Err(e) => {
                    run.skipped_items += 1;
                    tracing::warn!(
                        run_id = %run.run_id,
                        artist_id = %artist.id,
                        error = %e,
                        "Artist albums failed, skipping artist"
                    );
                }
            }
            run.tracker
                .item_completed(SyncStage::LoadBaseCatalogData, completed, total);
        }
        drop(fetches);

        tracing::info!(run_id = %run.run_id, albums = merged.len(), "Base catalog loaded");
        run.merged = merged;
        Ok(())
    }

    /// Date-filter the merged map and canonicalize what remains
    pub(super) fn phase_merge_and_filter(&self, run: &mut RunAttempt<'_>) {
        let merged = std::mem::take(&mut run.merged);
        let candidates = merged.len();
        run.albums = filter_and_canonicalize(merged, run.window);

        tracing::info!(
            run_id = %run.run_id,
            candidates,
            kept = run.albums.len(),
            "Albums filtered to date window"
        );
    }

    /// Label, popularity and track count in batches of [`ALBUM_BATCH_SIZE`]
    pub(super) async fn phase_load_extended_catalog(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        let mut ids: Vec<String> = run.albums.keys().cloned().collect();
        ids.sort();

        let batches: Vec<Vec<String>> = ids
            .chunks(ALBUM_BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total = batches.len();

        let mut responses = run
            .pool
            .submit_all(batches.into_iter().map(|ids| SyncJob::AlbumDetails { ids }));
        let mut completed = 0;

        while let Some(response) = next_or_cancelled(run.cancel, &mut responses).await? {
            completed += 1;
            match response.result.and_then(SyncOutput::into_details) {
                Ok(details) => {
                    for entry in details {
                        if let Some(album) = run.albums.remove(&entry.id) {
                            run.albums
                                .insert(entry.id.clone(), apply_details(album, &entry));
                        }
                    }
                }
                Err(e) => {
                    run.skipped_items += 1;
                    tracing::warn!(
                        run_id = %run.run_id,
                        job_id = response.id,
                        error = %e,
                        "Album details batch failed, keeping base data"
                    );
                }
            }
            run.tracker
                .item_completed(SyncStage::LoadExtendedCatalogData, completed, total);
        }

        tracing::debug!(run_id = %run.run_id, batches = total, "Extended catalog loaded");
        Ok(())
    }
}
