//! Outer retry wrapper
//!
//! Re-runs a whole attempt after a failure, up to `max_attempts`. Attempt `n`
//! is followed by a wait of `base_delay * n`. Attempts share nothing: each one
//! builds its own pool and progress.
//!
//! **Terminal events:** exactly one `SyncFailed` once attempts are exhausted or
//! a non-retryable error occurs, or one `SyncCancelled` after cancellation.
//! Success events are left to the caller.

use crate::error::SyncError;
use relist_common::config::EngineConfig;
use relist_common::events::{EventBus, SyncEvent};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(engine: &EngineConfig) -> Self {
        Self {
            max_attempts: engine.max_attempts.max(1),
            base_delay: Duration::from_millis(engine.retry_base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `attempt_fn(1..=max_attempts)` until one succeeds
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    run_id: Uuid,
    event_bus: &EventBus,
    cancel: &CancellationToken,
    mut attempt_fn: F,
) -> Result<T, SyncError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match attempt_fn(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(run_id = %run_id, attempt, "Sync succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if matches!(error, SyncError::Cancelled) || cancel.is_cancelled() {
            return Err(cancelled(run_id, event_bus));
        }

        if !error.is_retryable() || attempt >= max_attempts {
            tracing::error!(
                run_id = %run_id,
                attempts = attempt,
                error = %error,
                "Sync failed"
            );
            event_bus.emit_lossy(SyncEvent::SyncFailed {
                run_id,
                message: error.to_string(),
                attempts: attempt,
                timestamp: chrono::Utc::now(),
            });
            return Err(error);
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            run_id = %run_id,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Sync attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(run_id, event_bus)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled(run_id: Uuid, event_bus: &EventBus) -> SyncError {
    tracing::info!(run_id = %run_id, "Sync cancelled");
    event_bus.emit_lossy(SyncEvent::SyncCancelled {
        run_id,
        timestamp: chrono::Utc::now(),
    });
    SyncError::Cancelled
}
