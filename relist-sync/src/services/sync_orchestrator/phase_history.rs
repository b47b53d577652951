//! UPDATE_HISTORY_TRACKING and FINALIZE

use super::{RunAttempt, SyncOrchestrator};
use crate::error::SyncError;
use crate::services::affinity_calculator::smart_sort;
use relist_common::models::Album;
use std::collections::HashSet;
use uuid::Uuid;

impl SyncOrchestrator {
    /// Report albums the store has not seen
    ///
    /// The ids are written by [`SyncOrchestrator::commit_history`] once the
    /// attempt can no longer be cancelled.
    pub(super) async fn phase_update_history(
        &self,
        run: &mut RunAttempt<'_>,
    ) -> Result<(), SyncError> {
        let history = self.history.lock().await;

        let mut new_ids: Vec<String> = run
            .albums
            .keys()
            .filter(|id| !history.has(id))
            .cloned()
            .collect();
        new_ids.sort();

        tracing::debug!(run_id = %run.run_id, new_albums = new_ids.len(), "New albums identified");
        run.new_album_ids = new_ids;
        run.history_pending = Some(run.albums.keys().cloned().collect());
        Ok(())
    }

    /// Remember the synced ids
    ///
    /// A failed persist is logged; the in-memory set still holds the ids.
    pub(super) async fn commit_history(&self, run_id: Uuid, synced: HashSet<String>) {
        let mut history = self.history.lock().await;
        history.append(&synced);

        if let Err(e) = history.persist().await {
            tracing::warn!(run_id = %run_id, error = %e, "History persist failed");
        }

        tracing::info!(run_id = %run_id, history_size = history.size(), "History updated");
    }

    /// Fix the display order
    pub(super) fn phase_finalize(&self, run: &mut RunAttempt<'_>) {
        let weight = if run.settings.enable_smart_sort {
            run.settings.smart_sort_weight
        } else {
            0
        };

        let albums: Vec<Album> = run.albums.values().cloned().collect();
        run.album_order = smart_sort(albums, weight)
            .into_iter()
            .map(|album| album.id)
            .collect();
    }
}
