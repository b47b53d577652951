//! Stage plan and weighted progress
//!
//! Every stage owns a `[floor, ceiling]` band of the 0-100 progress range. The
//! plan is computed once per run from the enabled feature set: a skipped
//! stage's weight carries forward into the next enabled stage, so the bands
//! always tile 0-100 and the final ceiling is exactly 100.

use relist_common::events::{EventBus, SyncEvent, SyncStage};
use relist_common::settings::SyncSettings;
use uuid::Uuid;

/// Relative weight of each stage; sums to 100
pub fn stage_weight(stage: SyncStage) -> f64 {
    match stage {
        SyncStage::Init => 0.0,
        SyncStage::LoadUser => 2.0,
        SyncStage::LoadArtists => 8.0,
        SyncStage::LoadTopArtists => 5.0,
        SyncStage::LoadListeningHistory => 5.0,
        SyncStage::LoadBaseCatalogData => 55.0,
        SyncStage::MergeAndFilter => 2.0,
        SyncStage::LoadExtendedCatalogData => 15.0,
        SyncStage::ComputeAffinity => 3.0,
        SyncStage::UpdateHistoryTracking => 2.0,
        SyncStage::Finalize => 3.0,
    }
}

/// Whether `stage` runs under `settings`
pub fn stage_enabled(stage: SyncStage, settings: &SyncSettings) -> bool {
    match stage {
        SyncStage::LoadTopArtists | SyncStage::ComputeAffinity => settings.enable_smart_sort,
        SyncStage::LoadListeningHistory => settings.listening_history_enabled(),
        SyncStage::LoadExtendedCatalogData => settings.full_album_data,
        SyncStage::UpdateHistoryTracking => settings.track_history,
        _ => true,
    }
}

/// Progress band of one enabled stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBand {
    pub stage: SyncStage,
    pub floor: f64,
    pub ceiling: f64,
}

impl StageBand {
    /// Progress after `completed` of `total` items
    pub fn at(&self, completed: usize, total: usize) -> f64 {
        if total == 0 {
            return self.ceiling;
        }
        let fraction = (completed.min(total) as f64) / (total as f64);
        self.floor + fraction * (self.ceiling - self.floor)
    }
}

/// Ordered bands of the enabled stages
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    bands: Vec<StageBand>,
}

impl StagePlan {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(|stage| stage_enabled(stage, settings))
    }

    /// Plan for the stages `enabled` accepts; first and last always run
    pub fn new(enabled: impl Fn(SyncStage) -> bool) -> Self {
        let mut bands = Vec::new();
        let mut floor = 0.0;
        let mut carried = 0.0;

        for stage in SyncStage::ALL {
            let always = !stage.is_optional();
            if !(always || enabled(stage)) {
                carried += stage_weight(stage);
                continue;
            }
            let ceiling = floor + carried + stage_weight(stage);
            bands.push(StageBand {
                stage,
                floor,
                ceiling,
            });
            floor = ceiling;
            carried = 0.0;
        }

        if let Some(last) = bands.last_mut() {
            last.ceiling = 100.0;
        }

        Self { bands }
    }

    pub fn band(&self, stage: SyncStage) -> Option<StageBand> {
        self.bands.iter().copied().find(|b| b.stage == stage)
    }

    pub fn contains(&self, stage: SyncStage) -> bool {
        self.band(stage).is_some()
    }

    pub fn stages(&self) -> impl Iterator<Item = SyncStage> + '_ {
        self.bands.iter().map(|b| b.stage)
    }
}

/// Emits stage boundaries and monotonic progress for one run attempt
pub struct ProgressTracker {
    run_id: Uuid,
    event_bus: EventBus,
    plan: StagePlan,
    current: f64,
}

impl ProgressTracker {
    pub fn new(run_id: Uuid, event_bus: EventBus, plan: StagePlan) -> Self {
        Self {
            run_id,
            event_bus,
            plan,
            current: 0.0,
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn start_stage(&mut self, stage: SyncStage) {
        tracing::debug!(run_id = %self.run_id, stage = %stage, "Stage started");
        self.event_bus.emit_lossy(SyncEvent::StageStarted {
            run_id: self.run_id,
            stage,
            timestamp: chrono::Utc::now(),
        });
        if let Some(band) = self.plan.band(stage) {
            self.emit(stage, band.floor);
        }
    }

    /// Progress after each individual item of a fan-out
    pub fn item_completed(&mut self, stage: SyncStage, completed: usize, total: usize) {
        if let Some(band) = self.plan.band(stage) {
            self.emit(stage, band.at(completed, total));
        }
    }

    pub fn finish_stage(&mut self, stage: SyncStage) {
        if let Some(band) = self.plan.band(stage) {
            self.emit(stage, band.ceiling);
        }
        self.event_bus.emit_lossy(SyncEvent::StageFinished {
            run_id: self.run_id,
            stage,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Final 100% emission
    pub fn complete(&mut self) {
        self.emit(SyncStage::Finalize, 100.0);
    }

    fn emit(&mut self, stage: SyncStage, progress: f64) {
        let progress = progress.clamp(0.0, 100.0);
        // Never step backwards
        if progress < self.current {
            return;
        }
        self.current = progress;
        self.event_bus.emit_lossy(SyncEvent::SyncProgress {
            run_id: self.run_id,
            stage,
            progress,
        });
    }
}
