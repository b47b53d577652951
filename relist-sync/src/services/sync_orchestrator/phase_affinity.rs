//! LOAD_TOP_ARTISTS, LOAD_LISTENING_HISTORY and COMPUTE_AFFINITY
//!
//! Both signal loads are best-effort: a failure leaves that signal empty and
//! the run continues with degraded scores. Only cancellation ends the stage.

use super::{RunAttempt, SyncJob, SyncOrchestrator, SyncOutput};
use crate::error::SyncError;
use crate::services::affinity_calculator::{album_score, artist_scores};
use crate::services::catalog_client::{TimeRange, PAGE_LIMIT};
use crate::services::lastfm_client::{LASTFM_MAX_ARTISTS, LASTFM_PAGE_LIMIT};
use crate::workflow::fetch_offset_paged;
use relist_common::events::{SyncEvent, SyncStage};
use relist_common::models::AffinityCategory;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Longest ranking window read per time range
pub const TOP_ARTISTS_MAX: u32 = 500;

impl SyncOrchestrator {
    /// Medium- and long-term top artists
    pub(super) async fn phase_load_top_artists(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        let windows = [TimeRange::MediumTerm, TimeRange::LongTerm];

        for (index, time_range) in windows.into_iter().enumerate() {
            let fetch = fetch_offset_paged(
                &run.pool,
                PAGE_LIMIT,
                Some(TOP_ARTISTS_MAX),
                |offset, limit| SyncJob::TopArtists {
                    time_range,
                    offset,
                    limit,
                },
                SyncOutput::into_artists,
            );

            let artists = match until_cancelled(run.cancel, fetch).await {
                Ok(artists) => artists,
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        run_id = %run.run_id,
                        time_range = time_range.as_str(),
                        error = %e,
                        "Top artists unavailable, continuing without them"
                    );
                    Vec::new()
                }
            };

            tracing::debug!(
                run_id = %run.run_id,
                time_range = time_range.as_str(),
                count = artists.len(),
                "Top artists loaded"
            );
            match time_range {
                TimeRange::MediumTerm => run.affinity_inputs.medium_term = artists,
                TimeRange::LongTerm => run.affinity_inputs.long_term = artists,
            }
            run.tracker
                .item_completed(SyncStage::LoadTopArtists, index + 1, windows.len());
        }

        Ok(())
    }

    /// All-time top artists of the configured listening-history user
    pub(super) async fn phase_load_listening_history(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        if !run.scrobble_available {
            tracing::warn!(run_id = %run.run_id, "Listening history enabled but no client configured");
            return Ok(());
        }
        let Some(username) = run
            .settings
            .lastfm_username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        else {
            return Ok(());
        };

        let fetch = fetch_offset_paged(
            &run.pool,
            LASTFM_PAGE_LIMIT,
            Some(LASTFM_MAX_ARTISTS),
            |offset, limit| SyncJob::ScrobbleTopArtists {
                username: username.to_string(),
                page: offset / limit + 1,
                limit,
            },
            SyncOutput::into_scrobbles,
        );

        match until_cancelled(run.cancel, fetch).await {
            Ok(scrobbles) => {
                tracing::info!(run_id = %run.run_id, artists = scrobbles.len(), "Listening history loaded");
                run.affinity_inputs.scrobbles = scrobbles;
            }
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    run_id = %run.run_id,
                    error = %e,
                    "Listening history unavailable, continuing without it"
                );
            }
        }

        Ok(())
    }

    /// Score every contributor and every album
    pub(super) fn phase_compute_affinity(&self, run: &mut RunAttempt<'_>) {
        let scores = artist_scores(
            &run.affinity_inputs,
            run.albums.values().flat_map(|album| album.all_artists()),
        );

        for album in run.albums.values_mut() {
            let score = album_score(album, &scores);
            album.affinity = Some(score);
            album.affinity_category = Some(AffinityCategory::from_score(score));
        }

        tracing::info!(run_id = %run.run_id, scored_artists = scores.len(), "Affinity computed");
        self.event_bus.emit_lossy(SyncEvent::AffinityComputed {
            run_id: run.run_id,
            scores,
        });
    }
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, fetch: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, SyncError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fetch => result,
    }
}
