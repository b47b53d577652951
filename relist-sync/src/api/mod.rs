//! HTTP API handlers for relist-sync
//!
//! Sync control via HTTP REST, progress via SSE.

pub mod health;
pub mod settings;
pub mod sse;
pub mod sync;

pub use health::health_routes;
pub use settings::settings_routes;
pub use sse::{event_routes, event_stream};
pub use sync::sync_routes;
