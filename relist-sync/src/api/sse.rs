//! Server-Sent Events (SSE) for sync progress streaming
//!
//! `GET /events` streams every `SyncEvent` under its type name.
//! `GET /events?run_id=<uuid>` follows a single run and closes after that
//! run's terminal event. A receiver that falls behind gets a `Lagged` event
//! carrying the number of dropped events; `GET /sync/status` then tells the
//! client where the run stands.

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use relist_common::events::SyncEvent;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Query parameters of `GET /events`
#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only stream events of this run
    pub run_id: Option<Uuid>,
}

impl EventFilter {
    fn accepts(&self, event: &SyncEvent) -> bool {
        self.run_id.map_or(true, |id| event.run_id() == id)
    }
}

fn to_sse(event: &SyncEvent) -> Option<Event> {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!(event_type = event.event_type(), error = %e, "SSE: Failed to serialize event");
            None
        }
    }
}

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(run_id = ?filter.run_id, "SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) if filter.accepts(&event) => {
                    let terminal = filter.run_id.is_some() && event.is_terminal();
                    if let Some(sse) = to_sse(&event) {
                        yield Ok(sse);
                    }
                    if terminal {
                        debug!(run_id = %event.run_id(), "SSE: Run ended, closing stream");
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: Client lagging, events dropped");
                    yield Ok(Event::default().event("Lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("SSE: Sync event stream ended");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}

/// Build SSE routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cancelled(run_id: Uuid) -> SyncEvent {
        SyncEvent::SyncCancelled {
            run_id,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_filter_by_run() {
        let wanted = Uuid::new_v4();
        let filter = EventFilter {
            run_id: Some(wanted),
        };

        assert!(filter.accepts(&cancelled(wanted)));
        assert!(!filter.accepts(&cancelled(Uuid::new_v4())));
        assert!(EventFilter::default().accepts(&cancelled(Uuid::new_v4())));
    }
}
