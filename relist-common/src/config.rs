//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Runtime overrides (Last.fm
//! API key, sync settings) live in the database settings table and are resolved
//! by the service crate.

use crate::settings::SyncSettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "RELIST_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "relist.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for the database (optional, see `resolve_root_folder`)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP port override
    #[serde(default)]
    pub port: Option<u16>,

    /// Catalog API bearer token
    #[serde(default)]
    pub access_token: Option<String>,

    /// Last.fm API key (lowest priority tier)
    #[serde(default)]
    pub lastfm_api_key: Option<String>,

    /// Sync settings snapshot used when the database holds none
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent request workers per run
    pub worker_count: usize,
    /// Full-run attempts before the run is reported as failed
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * base`
    pub retry_base_delay_ms: u64,
    /// Longest wait for the terminal-animation signal after 100%
    pub completion_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 6,
            max_attempts: 3,
            retry_base_delay_ms: 2000,
            completion_grace_ms: 1000,
        }
    }
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable (`RELIST_ROOT_FOLDER`)
/// 3. TOML config file `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: Option<&TomlConfig>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_config.and_then(|c| c.root_folder.clone()) {
        return path;
    }

    default_root_folder()
}

/// Default configuration file path (`<config dir>/relist/config.toml`)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("relist").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("relist"))
        .unwrap_or_else(|| PathBuf::from("./relist_data"))
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Load TOML config; a missing file yields the defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    config.sync.validate()?;
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// User-Agent sent to every remote API
pub fn get_user_agent() -> String {
    format!(
        "relist/{} (+https://github.com/relist/relist)",
        env!("CARGO_PKG_VERSION")
    )
}
