//! Sync engine integration tests
//!
//! Full runs of the orchestrator against the in-memory catalog double:
//! stage sequencing, weighted progress, merge/filter, affinity, history,
//! retry and cancellation.

mod helpers;

use helpers::*;
use relist_common::events::{SyncEvent, SyncStage};
use relist_common::models::{
    AffinityCategory, AlbumDetails, AlbumGroup, ArtistSource, ScrobbleArtist,
};
use relist_common::settings::SyncSettings;
use relist_sync::services::{HistoryStore, RunHandle, RunRequest, StaticTokenAuth};
use relist_sync::SyncError;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn request(settings: SyncSettings) -> RunRequest {
    RunRequest {
        settings,
        auto: false,
        previous_sync_max_date: None,
        today: date(2024, 6, 15),
    }
}

/// Catalog with three followed artists: `a` and `b` share one album under
/// different roles, `c` always fails.
fn release_catalog() -> FakeCatalog {
    let a = artist("a");
    let b = artist("b");
    let c = artist("c");
    let guest = artist("guest");

    let shared_as_a = catalog_album("shared", AlbumGroup::Album, date(2024, 6, 1), &[&a, &b, &guest]);
    let mut shared_as_b = shared_as_a.clone();
    shared_as_b.album_group = AlbumGroup::AppearsOn;

    let mut catalog = FakeCatalog::new()
        .with_discography(
            &a,
            vec![
                shared_as_a,
                catalog_album("edge", AlbumGroup::Single, date(2024, 5, 16), &[&a]),
                catalog_album("old", AlbumGroup::Album, date(2024, 1, 1), &[&a]),
            ],
        )
        .with_discography(
            &b,
            vec![
                shared_as_b,
                catalog_album("tomorrow", AlbumGroup::Album, date(2024, 6, 16), &[&b]),
                catalog_album("far", AlbumGroup::Album, date(2024, 6, 17), &[&b]),
            ],
        );
    catalog.followed = vec![a.clone(), b.clone(), c.clone()];
    catalog.failing_artists.insert(c.id.clone());
    catalog.top_medium = vec![a];
    catalog.top_long = vec![b];
    catalog.details.insert(
        "shared".to_string(),
        AlbumDetails {
            id: "shared".to_string(),
            label: Some("Shared Label".to_string()),
            popularity: Some(55),
            total_tracks: 12,
        },
    );
    catalog
}

fn all_features() -> SyncSettings {
    SyncSettings {
        artist_sources: vec![ArtistSource::Followed],
        days: 30,
        groups: vec![AlbumGroup::Album, AlbumGroup::Single, AlbumGroup::AppearsOn],
        full_album_data: true,
        track_history: true,
        enable_smart_sort: true,
        smart_sort_weight: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_run_produces_canonical_albums() {
    // Given: every optional stage enabled and "edge" already in history
    let catalog = Arc::new(release_catalog());
    let history = memory_history(&["edge"]);
    let orchestrator = build_orchestrator(catalog.clone(), history.clone());
    let mut rx = orchestrator.event_bus().subscribe();

    // When: one run completes
    let payload = orchestrator
        .run(request(all_features()), &RunHandle::new())
        .await
        .unwrap();

    // Then: only albums inside [today - 30, today + 1] survive
    let mut ids: Vec<&str> = payload.albums.keys().map(String::as_str).collect();
    ids.sort();
    assert_eq!(ids, vec!["edge", "shared", "tomorrow"]);
    assert_eq!(payload.sync_max_date, date(2024, 6, 16));
    assert_eq!(payload.user.id, "user-1");

    // Roles from both discographies merged, guest in the overflow list
    let shared = &payload.albums["shared"];
    assert_eq!(shared.artists[&AlbumGroup::Album], vec![artist("a")]);
    assert_eq!(shared.artists[&AlbumGroup::AppearsOn], vec![artist("b")]);
    assert_eq!(shared.other_artists, vec![artist("guest")]);
    assert_eq!(shared.label.as_deref(), Some("Shared Label"));
    assert_eq!(shared.total_tracks, 12);

    // a: 0.7 * 100, b: 0.3 * 100; shared gets the multi-contributor bonus
    assert_eq!(shared.affinity, Some(75.0));
    assert_eq!(payload.albums["edge"].affinity, Some(70.0));
    assert_eq!(payload.albums["tomorrow"].affinity, Some(30.0));
    assert_eq!(shared.affinity_category, Some(AffinityCategory::High));
    assert_eq!(payload.albums["tomorrow"].affinity_category, Some(AffinityCategory::Low));
    assert_eq!(payload.album_order, vec!["shared", "edge", "tomorrow"]);

    assert_eq!(payload.new_album_ids, vec!["shared", "tomorrow"]);
    assert_eq!(history.lock().await.size(), 3);

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::AffinityComputed { scores, .. } if scores.len() == 2)));
    let finished = events
        .iter()
        .filter(|e| matches!(e, SyncEvent::SyncFinished { .. }))
        .count();
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_100() {
    let orchestrator = build_orchestrator(Arc::new(release_catalog()), memory_history(&[]));
    let mut rx = orchestrator.event_bus().subscribe();

    orchestrator
        .run(request(all_features()), &RunHandle::new())
        .await
        .unwrap();

    let events = drain(&mut rx);
    let values = progress_values(&events);
    assert!(!values.is_empty());
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "progress stepped backwards: {:?}",
        values
    );
    assert_eq!(values.last().copied(), Some(100.0));

    // Every enabled stage started and finished in order
    let started: Vec<SyncStage> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(started.first(), Some(&SyncStage::Init));
    assert_eq!(started.last(), Some(&SyncStage::Finalize));
    assert!(started.contains(&SyncStage::ComputeAffinity));
    assert!(!started.contains(&SyncStage::LoadListeningHistory));
}

#[tokio::test]
async fn test_minimal_run_skips_optional_stages() {
    let orchestrator = build_orchestrator(Arc::new(release_catalog()), memory_history(&[]));
    let mut rx = orchestrator.event_bus().subscribe();
    let settings = SyncSettings {
        groups: vec![AlbumGroup::Album],
        ..Default::default()
    };

    let payload = orchestrator
        .run(request(settings), &RunHandle::new())
        .await
        .unwrap();

    // No affinity, no history, no details; release date orders the albums
    assert!(payload.albums.values().all(|a| a.affinity.is_none()));
    assert!(payload.albums.values().all(|a| a.affinity_category.is_none()));
    assert!(payload.new_album_ids.is_empty());
    assert!(payload.albums["shared"].label.is_none());
    assert_eq!(payload.album_order, vec!["tomorrow", "shared"]);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SyncEvent::StageStarted { stage: SyncStage::LoadTopArtists, .. })));
    assert_eq!(progress_values(&events).last().copied(), Some(100.0));
}

#[tokio::test]
async fn test_listening_history_blends_into_affinity() {
    let catalog = Arc::new(release_catalog());
    let orchestrator = build_orchestrator(catalog, memory_history(&[])).with_scrobble(Arc::new(
        FakeScrobble {
            artists: vec![ScrobbleArtist {
                name: "artist A".to_string(),
                playcount: 100,
                rank: 1,
            }],
            fail: false,
        },
    ));
    let settings = SyncSettings {
        lastfm_enabled: true,
        lastfm_sync_enabled: true,
        lastfm_api_key: Some("key".to_string()),
        lastfm_username: Some("listener".to_string()),
        ..all_features()
    };

    let payload = orchestrator
        .run(request(settings), &RunHandle::new())
        .await
        .unwrap();

    // a: 0.6 * 70 + 0.4 * 100
    assert_eq!(payload.albums["edge"].affinity, Some(82.0));
}

#[tokio::test]
async fn test_snapshot_api_key_enables_listening_history() {
    // Given: no client at startup, only a connector for the run's key
    let connector = Arc::new(FakeConnector::new(FakeScrobble {
        artists: vec![ScrobbleArtist {
            name: "artist A".to_string(),
            playcount: 100,
            rank: 1,
        }],
        fail: false,
    }));
    let orchestrator = build_orchestrator(Arc::new(release_catalog()), memory_history(&[]))
        .with_scrobble_connector(connector.clone());
    let settings = SyncSettings {
        lastfm_enabled: true,
        lastfm_sync_enabled: true,
        lastfm_api_key: Some(" snapshot-key ".to_string()),
        lastfm_username: Some("listener".to_string()),
        ..all_features()
    };

    let payload = orchestrator
        .run(request(settings), &RunHandle::new())
        .await
        .unwrap();

    assert_eq!(payload.albums["edge"].affinity, Some(82.0));
    assert_eq!(connector.keys(), vec!["snapshot-key".to_string()]);
}

#[tokio::test]
async fn test_optional_signal_failures_degrade() {
    let mut catalog = release_catalog();
    catalog.fail_top_artists = true;
    let orchestrator = build_orchestrator(Arc::new(catalog), memory_history(&[])).with_scrobble(
        Arc::new(FakeScrobble {
            artists: Vec::new(),
            fail: true,
        }),
    );
    let settings = SyncSettings {
        lastfm_enabled: true,
        lastfm_sync_enabled: true,
        lastfm_api_key: Some("key".to_string()),
        lastfm_username: Some("listener".to_string()),
        ..all_features()
    };

    let payload = orchestrator
        .run(request(settings), &RunHandle::new())
        .await
        .unwrap();

    assert_eq!(payload.albums.len(), 3);
    assert!(payload.albums.values().all(|a| a.affinity == Some(0.0)));
}

#[tokio::test]
async fn test_saved_tracks_threshold() {
    let a = artist("a");
    let b = artist("b");
    let mut catalog = release_catalog();
    catalog.saved_tracks = vec![vec![a.clone()], vec![a.clone(), b.clone()]];
    let catalog = Arc::new(catalog);
    let orchestrator = build_orchestrator(catalog.clone(), memory_history(&[]));
    let settings = SyncSettings {
        artist_sources: vec![ArtistSource::SavedTracks],
        minimum_saved_tracks: 2,
        ..Default::default()
    };

    orchestrator
        .run(request(settings), &RunHandle::new())
        .await
        .unwrap();

    let calls = catalog.calls();
    assert!(calls.iter().any(|c| c.starts_with("albums artist=a ")));
    assert!(!calls.iter().any(|c| c.starts_with("albums artist=b ")));
}

#[tokio::test]
async fn test_large_sources_are_fully_paged() {
    // 120 followed artists over three cursor pages, 130 albums for one artist
    let prolific = artist("prolific");
    let albums: Vec<_> = (0..130)
        .map(|i| catalog_album(&format!("p{:03}", i), AlbumGroup::Album, date(2024, 6, 1), &[&prolific]))
        .collect();
    let mut catalog = FakeCatalog::new().with_discography(&prolific, albums);
    catalog.followed = (0..119).map(|i| artist(&format!("f{:03}", i))).collect();
    catalog.followed.push(prolific);
    let catalog = Arc::new(catalog);

    let orchestrator = build_orchestrator(catalog.clone(), memory_history(&[]));
    let payload = orchestrator
        .run(request(SyncSettings::default()), &RunHandle::new())
        .await
        .unwrap();

    assert_eq!(payload.albums.len(), 130);
    let cursor_calls: Vec<String> = catalog
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("following"))
        .collect();
    assert_eq!(
        cursor_calls,
        vec![
            "following after=None",
            "following after=Some(\"50\")",
            "following after=Some(\"100\")",
        ]
    );
}

#[tokio::test]
async fn test_run_succeeds_on_third_attempt() {
    let catalog = release_catalog();
    catalog.user_failures.store(2, std::sync::atomic::Ordering::SeqCst);
    let orchestrator = build_orchestrator(Arc::new(catalog), memory_history(&[]));
    let mut rx = orchestrator.event_bus().subscribe();

    let result = orchestrator
        .run(request(SyncSettings::default()), &RunHandle::new())
        .await;

    assert!(result.is_ok());
    let events = drain(&mut rx);
    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncStarted { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(!events.iter().any(|e| matches!(e, SyncEvent::SyncFailed { .. })));
}

#[tokio::test]
async fn test_exhausted_attempts_surface_one_error() {
    let catalog = FakeCatalog {
        user_failures: AtomicU32::new(10),
        ..FakeCatalog::new()
    };
    let orchestrator = build_orchestrator(Arc::new(catalog), memory_history(&[]));
    let mut rx = orchestrator.event_bus().subscribe();

    let result = orchestrator
        .run(request(SyncSettings::default()), &RunHandle::new())
        .await;

    assert!(result.is_err());
    let events = drain(&mut rx);
    let failures: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::SyncFailed { attempts, .. } => Some(*attempts),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![3]);
    assert!(!events.iter().any(|e| matches!(e, SyncEvent::SyncFinished { .. })));
}

#[tokio::test]
async fn test_declined_authorization_is_not_retried() {
    // Given: a grant without the top-artists scope smart sort needs
    let catalog = Arc::new(release_catalog());
    let orchestrator = build_orchestrator_with(
        catalog.clone(),
        memory_history(&[]),
        StaticTokenAuth::new("token").with_scopes(["user-follow-read"]),
        test_engine_config(),
    );
    let mut rx = orchestrator.event_bus().subscribe();

    let result = orchestrator
        .run(request(all_features()), &RunHandle::new())
        .await;

    assert!(matches!(result, Err(SyncError::Authorization(_))));
    assert!(catalog.calls().is_empty());
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SyncEvent::SyncFailed { attempts: 0, .. }));
}

#[tokio::test]
async fn test_cancel_mid_run() {
    let mut catalog = release_catalog();
    catalog.album_delay_ms = 300;
    let orchestrator = build_orchestrator(Arc::new(catalog), memory_history(&[]));
    let mut rx = orchestrator.event_bus().subscribe();
    let handle = RunHandle::new();

    let trigger = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = orchestrator.run(request(all_features()), &handle).await;

    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    let terminal: Vec<SyncEvent> = drain(&mut rx).into_iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], SyncEvent::SyncCancelled { .. }));
}

#[tokio::test]
async fn test_animation_signal_releases_terminal_wait() {
    // Given: a grace period far longer than the test
    let engine = relist_common::config::EngineConfig {
        completion_grace_ms: 30_000,
        ..test_engine_config()
    };
    let orchestrator = build_orchestrator_with(
        Arc::new(release_catalog()),
        memory_history(&[]),
        StaticTokenAuth::new("token"),
        engine,
    );
    let mut rx = orchestrator.event_bus().subscribe();
    let handle = RunHandle::new();

    // When: the presentation reports its animation done at 100%
    let signal = handle.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let SyncEvent::SyncProgress { progress, .. } = event {
                if progress >= 100.0 {
                    signal.finish_animation();
                    break;
                }
            }
        }
    });

    let started = Instant::now();
    let result = orchestrator.run(request(SyncSettings::default()), &handle).await;

    // Then: the run completes without waiting out the grace period
    assert!(result.is_ok());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_cancel_during_terminal_wait() {
    // Given: every stage done and a grace period longer than the test
    let engine = relist_common::config::EngineConfig {
        completion_grace_ms: 30_000,
        ..test_engine_config()
    };
    let history = memory_history(&["old-id"]);
    let orchestrator = build_orchestrator_with(
        Arc::new(release_catalog()),
        history.clone(),
        StaticTokenAuth::new("token"),
        engine,
    );
    let mut rx = orchestrator.event_bus().subscribe();
    let mut watcher = orchestrator.event_bus().subscribe();
    let handle = RunHandle::new();

    // When: the user cancels once progress reaches 100%
    let trigger = handle.clone();
    tokio::spawn(async move {
        while let Ok(event) = watcher.recv().await {
            if let SyncEvent::SyncProgress { progress, .. } = event {
                if progress >= 100.0 {
                    trigger.cancel();
                    break;
                }
            }
        }
    });

    let result = orchestrator.run(request(all_features()), &handle).await;

    // Then: the run ends cancelled and the history store is untouched
    assert!(matches!(result, Err(SyncError::Cancelled)));
    let terminal: Vec<SyncEvent> = drain(&mut rx).into_iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(terminal[0], SyncEvent::SyncCancelled { .. }));

    let history = history.lock().await;
    assert_eq!(history.size(), 1);
    assert!(!history.has("shared"));
}
