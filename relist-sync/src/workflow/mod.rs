//! Concurrency primitives of the sync engine
//!
//! - [`worker_pool`]: fixed-size worker set sharing one job queue
//! - [`pagination`]: offset-paged and cursor-paged fetch loops over the pool

pub mod pagination;
pub mod worker_pool;

pub use pagination::{fetch_cursor_paged, fetch_offset_paged, CursorPage};
pub use worker_pool::{JobExecutor, JobId, JobResponse, PendingResponse, ResponseStream, WorkerPool};
