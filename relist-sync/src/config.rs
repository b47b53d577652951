//! Configuration resolution for relist-sync
//!
//! Multi-tier resolution: Database → ENV → TOML for runtime settings, ENV →
//! TOML for the catalog access token.

use relist_common::config::TomlConfig;
use relist_common::settings::SyncSettings;
use relist_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable holding the Last.fm API key
pub const LASTFM_API_KEY_ENV: &str = "RELIST_LASTFM_API_KEY";

/// Environment variable holding the catalog bearer token
pub const ACCESS_TOKEN_ENV: &str = "RELIST_ACCESS_TOKEN";

/// Resolve the Last.fm API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML. `Ok(None)` when no tier has one;
/// listening history is optional.
pub async fn resolve_lastfm_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_lastfm_api_key(db).await?;
    let env_key = std::env::var(LASTFM_API_KEY_ENV).ok();
    let toml_key = toml_config.lastfm_api_key.clone();

    let tiers = [
        ("database", db_key),
        ("environment", env_key),
        ("TOML", toml_key),
    ];
    let sources: Vec<&str> = tiers
        .iter()
        .filter(|(_, key)| key.as_deref().is_some_and(is_valid_key))
        .map(|(source, _)| *source)
        .collect();

    if sources.len() > 1 {
        warn!(
            "Last.fm API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (source, key) in tiers {
        if let Some(key) = key.filter(|k| is_valid_key(k)) {
            info!("Last.fm API key loaded from {}", source);
            return Ok(Some(key));
        }
    }

    Ok(None)
}

/// Resolve the catalog access token
///
/// **Priority:** ENV → TOML. A missing token is a configuration error.
pub fn resolve_access_token(toml_config: &TomlConfig) -> Result<String> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if is_valid_key(&token) {
            info!("Access token loaded from environment variable");
            return Ok(token);
        }
    }

    if let Some(token) = toml_config.access_token.as_deref() {
        if is_valid_key(token) {
            info!("Access token loaded from TOML config");
            return Ok(token.to_string());
        }
    }

    Err(Error::Config(format!(
        "Catalog access token not configured. Please configure using one of:\n\
         1. Environment: {}=your-token\n\
         2. TOML config: access_token = \"your-token\"",
        ACCESS_TOKEN_ENV
    )))
}

/// Load the sync settings snapshot
///
/// **Priority:** Database → TOML `[sync]`. The resolved Last.fm API key fills
/// the snapshot when the snapshot carries none.
pub async fn load_sync_settings(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
    lastfm_api_key: Option<String>,
) -> Result<SyncSettings> {
    let mut settings = match crate::db::settings::get_sync_settings(db).await? {
        Some(settings) => {
            info!("Sync settings loaded from database");
            settings
        }
        None => {
            info!("Sync settings loaded from TOML config");
            toml_config.sync.clone()
        }
    };

    if !settings.lastfm_api_key.as_deref().is_some_and(is_valid_key) {
        settings.lastfm_api_key = lastfm_api_key;
    }

    settings.validate()?;
    Ok(settings)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
