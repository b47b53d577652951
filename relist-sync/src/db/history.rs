//! SQLite-backed album history
//!
//! The id set lives in memory; `persist` writes the additions since the last
//! flush (and a pending `clear`) in one transaction.

use crate::services::history_store::HistoryStore;
use async_trait::async_trait;
use relist_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;

pub struct SqliteHistoryStore {
    db: SqlitePool,
    ids: HashSet<String>,
    pending: HashSet<String>,
    cleared: bool,
}

impl SqliteHistoryStore {
    /// Load every remembered album id
    pub async fn load(db: SqlitePool) -> Result<Self> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT album_id FROM album_history")
            .fetch_all(&db)
            .await
            .map_err(Error::Database)?;

        let ids: HashSet<String> = rows.into_iter().map(|(id,)| id).collect();
        tracing::debug!(albums = ids.len(), "Album history loaded");

        Ok(Self {
            db,
            ids,
            pending: HashSet::new(),
            cleared: false,
        })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    fn has(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn add(&mut self, id: &str) {
        if self.ids.insert(id.to_string()) {
            self.pending.insert(id.to_string());
        }
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.pending.clear();
        self.cleared = true;
    }

    fn size(&self) -> usize {
        self.ids.len()
    }

    async fn persist(&mut self) -> Result<()> {
        if !self.cleared && self.pending.is_empty() {
            return Ok(());
        }

        let synced_at = chrono::Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await.map_err(Error::Database)?;

        if self.cleared {
            sqlx::query("DELETE FROM album_history")
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        for id in &self.pending {
            sqlx::query("INSERT OR IGNORE INTO album_history (album_id, synced_at) VALUES (?, ?)")
                .bind(id)
                .bind(&synced_at)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        tracing::debug!(written = self.pending.len(), cleared = self.cleared, "Album history persisted");
        self.pending.clear();
        self.cleared = false;
        Ok(())
    }
}
