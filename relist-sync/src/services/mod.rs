//! Sync engine services
//!
//! Leaves first: transport → API clients → merge/affinity → orchestrator.

pub mod affinity_calculator;
pub mod album_merger;
pub mod auth;
pub mod catalog_client;
pub mod history_store;
pub mod lastfm_client;
pub mod sync_orchestrator;
pub mod transport;

pub use auth::{AuthProvider, StaticTokenAuth};
pub use catalog_client::{CatalogApi, CatalogClient};
pub use history_store::{HistoryStore, MemoryHistoryStore};
pub use lastfm_client::{LastFmClient, LastFmConnector, ScrobbleApi, ScrobbleConnector};
pub use sync_orchestrator::{RunHandle, RunRequest, SharedHistory, SyncOrchestrator};
pub use transport::{RateLimitedTransport, ReqwestBackend, Transport};
