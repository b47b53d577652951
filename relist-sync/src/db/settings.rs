//! Settings database operations
//!
//! Key/value accessors over the `settings` table. Structured values (the sync
//! settings snapshot) are stored as JSON text.

use chrono::NaiveDate;
use relist_common::settings::SyncSettings;
use relist_common::{Error, Result};
use sqlx::{Pool, Sqlite};

const LASTFM_API_KEY: &str = "lastfm_api_key";
const SYNC_SETTINGS: &str = "sync_settings";
const PREVIOUS_SYNC_MAX_DATE: &str = "previous_sync_max_date";

/// Get Last.fm API key from database
///
/// **Returns:** Some(key) if exists, None if not set
pub async fn get_lastfm_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, LASTFM_API_KEY).await
}

/// Set Last.fm API key in database
pub async fn set_lastfm_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, LASTFM_API_KEY, key).await
}

/// Stored sync settings snapshot, if any
pub async fn get_sync_settings(db: &Pool<Sqlite>) -> Result<Option<SyncSettings>> {
    let Some(json) = get_setting::<String>(db, SYNC_SETTINGS).await? else {
        return Ok(None);
    };
    let settings: SyncSettings = serde_json::from_str(&json)
        .map_err(|e| Error::Config(format!("Parse sync settings failed: {}", e)))?;
    Ok(Some(settings))
}

/// Store a sync settings snapshot; invalid snapshots are rejected
pub async fn set_sync_settings(db: &Pool<Sqlite>, settings: &SyncSettings) -> Result<()> {
    settings.validate()?;
    let json = serde_json::to_string(settings)
        .map_err(|e| Error::Internal(format!("Serialize sync settings failed: {}", e)))?;
    set_setting(db, SYNC_SETTINGS, json).await
}

/// Upper date bound of the last successful run
pub async fn get_previous_sync_max_date(db: &Pool<Sqlite>) -> Result<Option<NaiveDate>> {
    get_setting(db, PREVIOUS_SYNC_MAX_DATE).await
}

pub async fn set_previous_sync_max_date(db: &Pool<Sqlite>, date: NaiveDate) -> Result<()> {
    set_setting(db, PREVIOUS_SYNC_MAX_DATE, date).await
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (internal)
async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relist_common::models::ArtistSource;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// In-memory database with the production schema
    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_lastfm_api_key_not_set() {
        let pool = setup_test_db().await;
        assert_eq!(get_lastfm_api_key(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lastfm_api_key_upsert() {
        let pool = setup_test_db().await;

        set_lastfm_api_key(&pool, "old_key".to_string()).await.unwrap();
        set_lastfm_api_key(&pool, "new_key".to_string()).await.unwrap();

        let result = get_lastfm_api_key(&pool).await.unwrap();
        assert_eq!(result, Some("new_key".to_string()));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settings WHERE key = 'lastfm_api_key'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1, "Should have exactly one entry after update");
    }

    #[tokio::test]
    async fn test_sync_settings_stored_as_json() {
        let pool = setup_test_db().await;
        assert_eq!(get_sync_settings(&pool).await.unwrap(), None);

        let settings = SyncSettings {
            artist_sources: vec![ArtistSource::SavedTracks],
            minimum_saved_tracks: 3,
            days: 7,
            ..Default::default()
        };
        set_sync_settings(&pool, &settings).await.unwrap();

        assert_eq!(get_sync_settings(&pool).await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_invalid_sync_settings_rejected() {
        let pool = setup_test_db().await;
        let settings = SyncSettings {
            days: 0,
            ..Default::default()
        };
        assert!(set_sync_settings(&pool, &settings).await.is_err());
        assert_eq!(get_sync_settings(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_sync_settings_is_config_error() {
        let pool = setup_test_db().await;
        sqlx::query("INSERT INTO settings (key, value) VALUES ('sync_settings', 'not json')")
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(get_sync_settings(&pool).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_previous_sync_max_date() {
        let pool = setup_test_db().await;
        assert_eq!(get_previous_sync_max_date(&pool).await.unwrap(), None);

        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        set_previous_sync_max_date(&pool, date).await.unwrap();
        assert_eq!(get_previous_sync_max_date(&pool).await.unwrap(), Some(date));
    }
}
