//! Album history contract
//!
//! Remembers which albums earlier runs already delivered, so a run can report
//! the new ones. Set operations are in-memory; [`HistoryStore::persist`]
//! flushes them to whatever backs the store.

use async_trait::async_trait;
use std::collections::HashSet;

/// Set of previously synced album ids
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn has(&self, id: &str) -> bool;

    fn add(&mut self, id: &str);

    fn clear(&mut self);

    fn size(&self) -> usize;

    /// Add every id of `other`
    fn append(&mut self, other: &HashSet<String>) {
        for id in other {
            self.add(id);
        }
    }

    async fn persist(&mut self) -> relist_common::Result<()>;
}

/// Volatile store; `persist` only counts calls
#[derive(Debug, Default, Clone)]
pub struct MemoryHistoryStore {
    ids: HashSet<String>,
    persisted: usize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            persisted: 0,
        }
    }

    /// Number of `persist` calls so far
    pub fn persist_count(&self) -> usize {
        self.persisted
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn has(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn add(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    fn clear(&mut self) {
        self.ids.clear();
    }

    fn size(&self) -> usize {
        self.ids.len()
    }

    async fn persist(&mut self) -> relist_common::Result<()> {
        self.persisted += 1;
        Ok(())
    }
}
