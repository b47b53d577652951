//! relist-sync - release radar sync service
//!
//! **Module Identity:**
//! - Name: relist-sync
//! - Default port: 5740
//!
//! Pulls the user's artists and their recent releases from the catalog API,
//! merges and scores them, and reports progress over HTTP + SSE. `--once`
//! runs a single sync in the foreground and prints the ordered albums.

use anyhow::{Context, Result};
use clap::Parser;
use relist_common::config::{self as common_config, TomlConfig};
use relist_common::events::{EventBus, SyncEvent};
use relist_sync::services::catalog_client::CATALOG_BASE_URL;
use relist_sync::services::lastfm_client::LASTFM_BASE_URL;
use relist_sync::services::{
    CatalogClient, LastFmConnector, RateLimitedTransport, ReqwestBackend, SharedHistory,
    StaticTokenAuth, SyncOrchestrator,
};
use relist_sync::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "relist-sync", version, about = "Release radar sync service")]
struct Args {
    /// Root folder holding the database
    #[arg(long, env = common_config::ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "RELIST_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "RELIST_PORT")]
    port: Option<u16>,

    /// Run one sync, print the result and exit
    #[arg(long)]
    once: bool,
}

const DEFAULT_PORT: u16 = 5740;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Bootstrap configuration
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => common_config::default_config_path()?,
    };
    let toml_config = common_config::load_toml_config(&config_path)?;

    // Step 2: Tracing (RUST_LOG wins over the TOML level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting relist-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    // Step 3: Root folder and database
    let root_folder = common_config::resolve_root_folder(args.root_folder.as_deref(), Some(&toml_config));
    let db_path = common_config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db_pool = relist_sync::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 4: Runtime settings
    let access_token = relist_sync::config::resolve_access_token(&toml_config)?;
    let lastfm_api_key = relist_sync::config::resolve_lastfm_api_key(&db_pool, &toml_config).await?;
    let settings =
        relist_sync::config::load_sync_settings(&db_pool, &toml_config, lastfm_api_key.clone()).await?;

    // Step 5: Engine
    if lastfm_api_key.is_none() {
        info!("No Last.fm API key configured, listening history needs one in the sync settings");
    }
    let orchestrator = build_orchestrator(&toml_config, &db_pool, access_token).await?;
    let state = AppState::new(db_pool, Arc::new(orchestrator), settings);

    if args.once {
        return run_once(state).await;
    }

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let app = relist_sync::build_router(state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("relist-sync stopped");
    Ok(())
}

async fn build_orchestrator(
    toml_config: &TomlConfig,
    db_pool: &sqlx::SqlitePool,
    access_token: String,
) -> Result<SyncOrchestrator> {
    let user_agent = common_config::get_user_agent();

    let catalog_transport = RateLimitedTransport::new(ReqwestBackend::new(&user_agent)?, CATALOG_BASE_URL);
    let catalog = Arc::new(CatalogClient::new(Arc::new(catalog_transport)));

    let history: SharedHistory = Arc::new(Mutex::new(
        relist_sync::db::SqliteHistoryStore::load(db_pool.clone()).await?,
    ));

    let event_bus = EventBus::new(256);
    // Each run builds its Last.fm client from the key in its settings snapshot
    let lastfm_transport = RateLimitedTransport::new(ReqwestBackend::new(&user_agent)?, LASTFM_BASE_URL);

    let orchestrator = SyncOrchestrator::new(
        catalog,
        Arc::new(StaticTokenAuth::new(access_token)),
        history,
        event_bus,
        toml_config.engine.clone(),
    )
    .with_scrobble_connector(Arc::new(LastFmConnector::new(Arc::new(lastfm_transport))));

    Ok(orchestrator)
}

/// Foreground run: log stage progress, print the ordered albums
async fn run_once(state: AppState) -> Result<()> {
    let mut rx = state.event_bus.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                SyncEvent::StageStarted { stage, .. } => info!("Stage: {}", stage),
                SyncEvent::SyncFailed { message, attempts, .. } => {
                    warn!(attempts, "Sync failed: {}", message);
                    break;
                }
                event if event.is_terminal() => break,
                _ => {}
            }
        }
    });

    let handle = state
        .begin_run()
        .await
        .context("A sync run is already active")?;
    let cancel = handle.clone();
    let result = tokio::select! {
        result = state.execute_run(handle, false) => result,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            anyhow::bail!("Interrupted");
        }
    };
    let _ = reporter.await;

    let payload = result?;
    println!(
        "{} albums between {} and {}",
        payload.albums.len(),
        payload
            .previous_sync_max_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "the start of the window".to_string()),
        payload.sync_max_date
    );
    for id in &payload.album_order {
        let Some(album) = payload.albums.get(id) else {
            continue;
        };
        let artists: Vec<&str> = album.all_artists().map(|a| a.name.as_str()).collect();
        let marker = if payload.new_album_ids.contains(id) { "*" } else { " " };
        println!(
            "{} {}  {}  {}",
            marker,
            album.release_date,
            album.name,
            artists.join(", ")
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
