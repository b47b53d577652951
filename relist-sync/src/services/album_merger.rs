//! Album merge, date-window filter and canonicalization
//!
//! **Algorithm:**
//! 1. Every artist-albums page yields [`RawAlbum`]s: one album seen under one
//!    artist's role (`album_group`).
//! 2. Raw albums are folded by album id. A second sighting of an id unions its
//!    role lists into the existing entry instead of replacing it, so the same
//!    album found under several artists keeps every attribution. Merging an
//!    album with itself changes nothing.
//! 3. The merged map is filtered to `[min_date, max_date]` (inclusive).
//! 4. Each surviving entry is canonicalized: roles in priority order, artists
//!    sorted by name within a role, and credited artists missing from every
//!    role moved to `other_artists`.
//!
//! Completion order of the fetches never matters: the fold is commutative and
//! canonicalization sorts.

use chrono::{Days, NaiveDate};
use relist_common::models::{
    Album, AlbumDetails, AlbumGroup, Artist, CatalogAlbum, ReleaseDatePrecision,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One album as seen in one artist's discography
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlbum {
    pub album: CatalogAlbum,
    /// The artist whose discography produced the album
    pub artist: Artist,
}

impl RawAlbum {
    pub fn new(album: CatalogAlbum, artist: Artist) -> Self {
        Self { album, artist }
    }
}

/// Album with accumulated role attribution, not yet canonical
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAlbum {
    pub album: CatalogAlbum,
    pub roles: BTreeMap<AlbumGroup, Vec<Artist>>,
}

impl From<RawAlbum> for MergedAlbum {
    fn from(raw: RawAlbum) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(raw.album.album_group, vec![raw.artist]);
        Self {
            album: raw.album,
            roles,
        }
    }
}

impl MergedAlbum {
    /// Union `other`'s role lists into `self`
    ///
    /// Album fields of `self` win; only attribution accumulates.
    pub fn merge(mut self, other: MergedAlbum) -> MergedAlbum {
        for (role, artists) in other.roles {
            let entry = self.roles.entry(role).or_default();
            for artist in artists {
                if !entry.iter().any(|a| a.id == artist.id) {
                    entry.push(artist);
                }
            }
        }
        self
    }
}

/// Fold `raw` into `albums`, returning the updated map
pub fn merge_album(
    mut albums: HashMap<String, MergedAlbum>,
    raw: RawAlbum,
) -> HashMap<String, MergedAlbum> {
    let incoming = MergedAlbum::from(raw);
    let merged = match albums.remove(&incoming.album.id) {
        Some(existing) => existing.merge(incoming),
        None => incoming,
    };
    albums.insert(merged.album.id.clone(), merged);
    albums
}

/// Fold a whole batch of raw albums
pub fn merge_albums<I>(raws: I) -> HashMap<String, MergedAlbum>
where
    I: IntoIterator<Item = RawAlbum>,
{
    raws.into_iter().fold(HashMap::new(), merge_album)
}

/// Inclusive release-date window of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}

impl DateWindow {
    /// `[today - days, today + 1]`; the extra day tolerates timezone skew
    pub fn for_run(today: NaiveDate, days: u32) -> Self {
        let min_date = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        let max_date = today.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Self { min_date, max_date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.min_date <= date && date <= self.max_date
    }
}

/// Parse a catalog release date to the first day of its period
///
/// `precision` caps how many components are used; a string with fewer
/// components than claimed still parses with the ones it has.
pub fn parse_release_date(raw: &str, precision: ReleaseDatePrecision) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    let wanted = match precision {
        ReleaseDatePrecision::Year => 1,
        ReleaseDatePrecision::Month => 2,
        ReleaseDatePrecision::Day => 3,
    };

    let year: i32 = parts.first()?.parse().ok()?;
    let month: u32 = if wanted >= 2 {
        parts.get(1).map_or(Some(1), |m| m.parse().ok())?
    } else {
        1
    };
    let day: u32 = if wanted >= 3 {
        parts.get(2).map_or(Some(1), |d| d.parse().ok())?
    } else {
        1
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Canonical form of one merged album dated `release_date`
pub fn canonicalize(merged: MergedAlbum, release_date: NaiveDate) -> Album {
    let MergedAlbum { album, roles } = merged;

    let mut artists: BTreeMap<AlbumGroup, Vec<Artist>> = BTreeMap::new();
    let mut attributed: HashSet<String> = HashSet::new();

    for (role, mut role_artists) in roles {
        role_artists.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        role_artists.dedup_by(|a, b| a.id == b.id);
        if role_artists.is_empty() {
            continue;
        }
        attributed.extend(role_artists.iter().map(|a| a.id.clone()));
        artists.insert(role, role_artists);
    }

    let mut other_artists: Vec<Artist> = Vec::new();
    for credited in album.artists {
        if !attributed.contains(&credited.id) && !other_artists.iter().any(|a| a.id == credited.id)
        {
            other_artists.push(credited);
        }
    }

    Album {
        id: album.id,
        name: album.name,
        album_type: album.album_type,
        release_date,
        release_date_precision: album.release_date_precision,
        image: album.image,
        total_tracks: album.total_tracks,
        artists,
        other_artists,
        label: None,
        popularity: None,
        affinity: None,
        affinity_category: None,
    }
}

/// Date-filter and canonicalize a merged map
///
/// Albums with an unparseable release date are dropped with a warning.
pub fn filter_and_canonicalize(
    merged: HashMap<String, MergedAlbum>,
    window: DateWindow,
) -> HashMap<String, Album> {
    let mut albums = HashMap::with_capacity(merged.len());

    for (id, entry) in merged {
        let Some(release_date) =
            parse_release_date(&entry.album.release_date, entry.album.release_date_precision)
        else {
            tracing::warn!(
                album_id = %id,
                release_date = %entry.album.release_date,
                "Dropping album with unparseable release date"
            );
            continue;
        };

        if !window.contains(release_date) {
            continue;
        }

        albums.insert(id, canonicalize(entry, release_date));
    }

    albums
}

/// Merge extended data into a canonical album
pub fn apply_details(mut album: Album, details: &AlbumDetails) -> Album {
    if details.label.is_some() {
        album.label = details.label.clone();
    }
    if details.popularity.is_some() {
        album.popularity = details.popularity;
    }
    if details.total_tracks > 0 {
        album.total_tracks = details.total_tracks;
    }
    album
}
