//! # relist common library
//!
//! Shared code for the relist workspace:
//! - Error types
//! - Bootstrap configuration and root folder resolution
//! - Sync settings snapshot
//! - Catalog domain models (artists, albums, album groups, users)
//! - Sync event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod settings;

pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent, SyncStage};
pub use settings::SyncSettings;
