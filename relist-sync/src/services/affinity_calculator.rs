//! Affinity scoring
//!
//! Pure functions of their inputs: no state, deterministic, recomputed every
//! run and never persisted.
//!
//! **Primary signal:** the user's top artists in two ranking windows. Position
//! `p` (0-based) scores `max(1, 100 - p/5)`; windows combine as
//! `0.7 * medium + 0.3 * long`, a window the artist is missing from adding 0.
//!
//! **Secondary signal:** listening-history play counts and ranks.
//! `50 * playcount / max_playcount + 50 * (1 - (rank - 1) / n)`.
//!
//! **Blend:** `0.6 * primary + 0.4 * secondary` when both are positive,
//! otherwise whichever is positive, otherwise 0.
//!
//! **Album:** the best contributor score, `+5` when more than one contributor
//! scores above zero, capped at 100.

use relist_common::models::{Album, Artist, ScrobbleArtist};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const MEDIUM_TERM_WEIGHT: f64 = 0.7;
pub const LONG_TERM_WEIGHT: f64 = 0.3;
pub const PRIMARY_WEIGHT: f64 = 0.6;
pub const SECONDARY_WEIGHT: f64 = 0.4;
pub const MULTI_CONTRIBUTOR_BONUS: f64 = 5.0;
pub const MAX_SCORE: f64 = 100.0;

/// Raw signals of one run
#[derive(Debug, Clone, Default)]
pub struct AffinityInputs {
    /// Top artists, best first, medium-term window
    pub medium_term: Vec<Artist>,
    /// Top artists, best first, long-term window
    pub long_term: Vec<Artist>,
    /// Listening-history top artists (may be empty)
    pub scrobbles: Vec<ScrobbleArtist>,
}

/// Score of position `p` in one ranking window
pub fn rank_score(position: usize) -> f64 {
    (MAX_SCORE - position as f64 / 5.0).max(1.0)
}

/// Primary scores keyed by artist id
pub fn primary_scores(medium_term: &[Artist], long_term: &[Artist]) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for (window, weight) in [(medium_term, MEDIUM_TERM_WEIGHT), (long_term, LONG_TERM_WEIGHT)] {
        let mut seen = HashSet::new();
        for (position, artist) in window.iter().enumerate() {
            // First occurrence wins within a window
            if !seen.insert(artist.id.as_str()) {
                continue;
            }
            *scores.entry(artist.id.clone()).or_insert(0.0) += weight * rank_score(position);
        }
    }

    scores
}

/// Secondary scores keyed by normalized artist name
pub fn secondary_scores(scrobbles: &[ScrobbleArtist]) -> HashMap<String, f64> {
    let n = scrobbles.len();
    if n == 0 {
        return HashMap::new();
    }
    let max_playcount = scrobbles.iter().map(|s| s.playcount).max().unwrap_or(0);

    let mut scores = HashMap::with_capacity(n);
    for entry in scrobbles {
        let playcount_score = if max_playcount > 0 {
            50.0 * entry.playcount as f64 / max_playcount as f64
        } else {
            0.0
        };
        let rank = entry.rank.max(1) as f64;
        let position_score = (50.0 * (1.0 - (rank - 1.0) / n as f64)).clamp(0.0, 50.0);

        scores
            .entry(normalize_name(&entry.name))
            .or_insert(playcount_score + position_score);
    }
    scores
}

/// Blend of one contributor's primary and secondary scores
pub fn blend(primary: Option<f64>, secondary: Option<f64>) -> f64 {
    let primary = primary.filter(|s| *s > 0.0);
    let secondary = secondary.filter(|s| *s > 0.0);
    match (primary, secondary) {
        (Some(p), Some(s)) => PRIMARY_WEIGHT * p + SECONDARY_WEIGHT * s,
        (Some(p), None) => p,
        (None, Some(s)) => s,
        (None, None) => 0.0,
    }
}

/// Blended score of every given contributor, keyed by artist id
///
/// Contributors with a zero score are left out of the map.
pub fn artist_scores<'a, I>(inputs: &'a AffinityInputs, contributors: I) -> HashMap<String, f64>
where
    I: IntoIterator<Item = &'a Artist>,
{
    let primary = primary_scores(&inputs.medium_term, &inputs.long_term);
    let secondary = secondary_scores(&inputs.scrobbles);

    let mut scores = HashMap::new();
    let candidates = contributors
        .into_iter()
        .chain(inputs.medium_term.iter())
        .chain(inputs.long_term.iter());

    for artist in candidates {
        if scores.contains_key(&artist.id) {
            continue;
        }
        let score = blend(
            primary.get(&artist.id).copied(),
            secondary.get(&normalize_name(&artist.name)).copied(),
        );
        if score > 0.0 {
            scores.insert(artist.id.clone(), score.min(MAX_SCORE));
        }
    }

    scores
}

/// Aggregate score of one album
pub fn album_score(album: &Album, scores: &HashMap<String, f64>) -> f64 {
    let mut seen = HashSet::new();
    let mut best = 0.0_f64;
    let mut scored = 0usize;

    for artist in album.all_artists() {
        if !seen.insert(artist.id.as_str()) {
            continue;
        }
        let score = scores.get(&artist.id).copied().unwrap_or(0.0);
        if score > 0.0 {
            scored += 1;
            best = best.max(score);
        }
    }

    if scored > 1 {
        best += MULTI_CONTRIBUTOR_BONUS;
    }
    best.min(MAX_SCORE)
}

/// Order albums for display
///
/// With `weight` at or above the smart-sort threshold affinity is the primary
/// key and release date (newest first) breaks ties; below it the keys swap.
/// Name then id make the order total.
pub fn smart_sort(mut albums: Vec<Album>, weight: u8) -> Vec<Album> {
    let affinity_first = weight >= relist_common::settings::SMART_SORT_PRIMARY_THRESHOLD;

    albums.sort_by(|a, b| {
        let by_affinity = b
            .affinity
            .unwrap_or(0.0)
            .total_cmp(&a.affinity.unwrap_or(0.0));
        let by_date = b.release_date.cmp(&a.release_date);

        let primary: Ordering = if affinity_first {
            by_affinity.then(by_date)
        } else {
            by_date.then(by_affinity)
        };
        primary
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });

    albums
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
