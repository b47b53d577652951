//! Sync event types and the broadcast event bus
//!
//! The event bus is the engine's progress/stage sink: stage boundaries,
//! per-item progress, affinity scores and the terminal finished/failed/cancelled
//! states all travel through it. Any number of consumers (SSE clients, the CLI
//! reporter, tests) may subscribe.

use crate::models::{Album, User};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sync run stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Init,
    LoadUser,
    LoadArtists,
    LoadTopArtists,
    LoadListeningHistory,
    LoadBaseCatalogData,
    MergeAndFilter,
    LoadExtendedCatalogData,
    ComputeAffinity,
    UpdateHistoryTracking,
    Finalize,
}

impl SyncStage {
    /// All stages in execution order
    pub const ALL: [SyncStage; 11] = [
        SyncStage::Init,
        SyncStage::LoadUser,
        SyncStage::LoadArtists,
        SyncStage::LoadTopArtists,
        SyncStage::LoadListeningHistory,
        SyncStage::LoadBaseCatalogData,
        SyncStage::MergeAndFilter,
        SyncStage::LoadExtendedCatalogData,
        SyncStage::ComputeAffinity,
        SyncStage::UpdateHistoryTracking,
        SyncStage::Finalize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SyncStage::Init => "init",
            SyncStage::LoadUser => "load_user",
            SyncStage::LoadArtists => "load_artists",
            SyncStage::LoadTopArtists => "load_top_artists",
            SyncStage::LoadListeningHistory => "load_listening_history",
            SyncStage::LoadBaseCatalogData => "load_base_catalog_data",
            SyncStage::MergeAndFilter => "merge_and_filter",
            SyncStage::LoadExtendedCatalogData => "load_extended_catalog_data",
            SyncStage::ComputeAffinity => "compute_affinity",
            SyncStage::UpdateHistoryTracking => "update_history_tracking",
            SyncStage::Finalize => "finalize",
        }
    }

    /// Stages that may be skipped depending on the enabled feature set
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            SyncStage::LoadTopArtists
                | SyncStage::LoadListeningHistory
                | SyncStage::LoadExtendedCatalogData
                | SyncStage::ComputeAffinity
                | SyncStage::UpdateHistoryTracking
        )
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFinishedPayload {
    /// Canonical album map keyed by album id
    pub albums: HashMap<String, Album>,
    pub user: User,
    /// Upper date bound of the previous successful run
    pub previous_sync_max_date: Option<NaiveDate>,
    /// Upper date bound of this run; the next run's previous max date
    pub sync_max_date: NaiveDate,
    /// Whether the run was started automatically rather than by the user
    pub auto: bool,
    /// Album ids in display order
    #[serde(default)]
    pub album_order: Vec<String>,
    /// Albums absent from the history store before this run
    #[serde(default)]
    pub new_album_ids: Vec<String>,
}

/// Sync event types
///
/// Serialized with an internal `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A run attempt started
    SyncStarted {
        run_id: Uuid,
        attempt: u32,
        auto: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage became active
    StageStarted {
        run_id: Uuid,
        stage: SyncStage,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Overall progress, 0-100, unrounded
    SyncProgress {
        run_id: Uuid,
        stage: SyncStage,
        progress: f64,
    },

    /// A stage completed; presentation may animate on it
    StageFinished {
        run_id: Uuid,
        stage: SyncStage,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Blended per-artist affinity scores
    AffinityComputed {
        run_id: Uuid,
        scores: HashMap<String, f64>,
    },

    /// Run completed successfully
    SyncFinished {
        run_id: Uuid,
        payload: Box<SyncFinishedPayload>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run ended with a user-visible error
    SyncFailed {
        run_id: Uuid,
        message: String,
        attempts: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run was cancelled explicitly
    SyncCancelled {
        run_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted { .. } => "SyncStarted",
            SyncEvent::StageStarted { .. } => "StageStarted",
            SyncEvent::SyncProgress { .. } => "SyncProgress",
            SyncEvent::StageFinished { .. } => "StageFinished",
            SyncEvent::AffinityComputed { .. } => "AffinityComputed",
            SyncEvent::SyncFinished { .. } => "SyncFinished",
            SyncEvent::SyncFailed { .. } => "SyncFailed",
            SyncEvent::SyncCancelled { .. } => "SyncCancelled",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            SyncEvent::SyncStarted { run_id, .. }
            | SyncEvent::StageStarted { run_id, .. }
            | SyncEvent::SyncProgress { run_id, .. }
            | SyncEvent::StageFinished { run_id, .. }
            | SyncEvent::AffinityComputed { run_id, .. }
            | SyncEvent::SyncFinished { run_id, .. }
            | SyncEvent::SyncFailed { run_id, .. }
            | SyncEvent::SyncCancelled { run_id, .. } => *run_id,
        }
    }

    /// Whether this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::SyncFinished { .. }
                | SyncEvent::SyncFailed { .. }
                | SyncEvent::SyncCancelled { .. }
        )
    }
}

/// Broadcast bus for sync events
///
/// Uses `tokio::sync::broadcast`: publishing never blocks on slow subscribers,
/// and a subscriber only sees events emitted after it subscribed.
///
/// # Examples
///
/// ```
/// use relist_common::events::{EventBus, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::SyncCancelled {
///     run_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is subscribed
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SyncEvent,
    ) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_starts_and_ends_fixed() {
        assert_eq!(SyncStage::ALL[0], SyncStage::Init);
        assert_eq!(SyncStage::ALL[SyncStage::ALL.len() - 1], SyncStage::Finalize);
        assert!(!SyncStage::Init.is_optional());
        assert!(!SyncStage::Finalize.is_optional());
        assert!(SyncStage::ComputeAffinity.is_optional());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SyncEvent::SyncProgress {
            run_id: Uuid::nil(),
            stage: SyncStage::LoadBaseCatalogData,
            progress: 42.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SyncProgress");
        assert_eq!(json["stage"], "load_base_catalog_data");
        assert_eq!(json["progress"], 42.5);
        assert_eq!(event.event_type(), "SyncProgress");
        assert!(!event.is_terminal());
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(SyncEvent::SyncCancelled {
            run_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        for progress in [10.0, 20.0, 30.0] {
            bus.emit_lossy(SyncEvent::SyncProgress {
                run_id,
                stage: SyncStage::LoadArtists,
                progress,
            });
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let SyncEvent::SyncProgress { progress, .. } = rx.recv().await.unwrap() {
                seen.push(progress);
            }
        }
        assert_eq!(seen, vec![10.0, 20.0, 30.0]);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
