//! Last.fm listening-history client
//!
//! Only `user.getTopArtists` is needed: it supplies the secondary affinity
//! signal (play counts and ranks). Requests are paced client-side with
//! `governor` at 5/s, then sent through the shared rate-limit-aware transport.
//!
//! Last.fm reports some failures as HTTP 200 with an error envelope
//! (`{"error": 6, "message": "User not found"}`); those surface as
//! [`TransportError::Status`] like any other failed request.

use crate::error::TransportError;
use crate::services::transport::{Method, Transport};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use relist_common::models::ScrobbleArtist;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

/// Last.fm API root
pub const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Page size for `user.getTopArtists`
pub const LASTFM_PAGE_LIMIT: u32 = 200;

/// Most top artists pulled per run
pub const LASTFM_MAX_ARTISTS: u32 = 1000;

const REQUESTS_PER_SECOND: u32 = 5;

/// Listening-history operations used by the sync engine
#[async_trait]
pub trait ScrobbleApi: Send + Sync {
    /// One page (1-based) of the user's all-time top artists
    async fn top_artists(
        &self,
        username: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<ScrobbleArtist>, TransportError>;
}

/// Builds the listening-history client for an API key
///
/// The key comes from the run's settings snapshot, so an edited key applies
/// from the next run on.
pub trait ScrobbleConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Arc<dyn ScrobbleApi>;
}

/// [`ScrobbleConnector`] over one shared transport
///
/// Reuses the client while the key is unchanged, so request pacing carries
/// across runs.
pub struct LastFmConnector {
    transport: Arc<dyn Transport>,
    current: Mutex<Option<(String, Arc<LastFmClient>)>>,
}

impl LastFmConnector {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            current: Mutex::new(None),
        }
    }
}

impl ScrobbleConnector for LastFmConnector {
    fn connect(&self, api_key: &str) -> Arc<dyn ScrobbleApi> {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((key, client)) = current.as_ref() {
            if key == api_key {
                return Arc::clone(client) as Arc<dyn ScrobbleApi>;
            }
        }
        tracing::debug!("Building Last.fm client for new API key");
        let client = Arc::new(LastFmClient::new(Arc::clone(&self.transport), api_key));
        *current = Some((api_key.to_string(), Arc::clone(&client)));
        client
    }
}

#[derive(Debug, Deserialize)]
struct RankAttr {
    rank: String,
}

#[derive(Debug, Deserialize)]
struct TopArtistDto {
    name: String,
    playcount: String,
    #[serde(rename = "@attr")]
    attr: Option<RankAttr>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageAttr {
    total_pages: String,
}

#[derive(Debug, Deserialize)]
struct TopArtists {
    #[serde(default)]
    artist: Vec<TopArtistDto>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}

#[derive(Debug, Deserialize)]
struct TopArtistsEnvelope {
    topartists: TopArtists,
}

/// Last.fm client
pub struct LastFmClient {
    transport: Arc<dyn Transport>,
    api_key: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl LastFmClient {
    pub fn new(transport: Arc<dyn Transport>, api_key: impl Into<String>) -> Self {
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);
        Self {
            transport,
            api_key: api_key.into(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    fn top_artists_url(&self, username: &str, page: u32, limit: u32) -> Result<String, TransportError> {
        let limit = limit.to_string();
        let page = page.to_string();
        let url = reqwest::Url::parse_with_params(
            LASTFM_BASE_URL,
            &[
                ("method", "user.gettopartists"),
                ("user", username),
                ("api_key", self.api_key.as_str()),
                ("period", "overall"),
                ("format", "json"),
                ("limit", limit.as_str()),
                ("page", page.as_str()),
            ],
        )
        .map_err(|e| TransportError::Parse(e.to_string()))?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl ScrobbleApi for LastFmClient {
    async fn top_artists(
        &self,
        username: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<ScrobbleArtist>, TransportError> {
        let url = self.top_artists_url(username, page.max(1), limit)?;

        self.rate_limiter.until_ready().await;
        let value = self.transport.request(&url, Method::Get, "", None).await?;
        parse_top_artists(value, page.max(1))
    }
}

fn parse_top_artists(value: Value, page: u32) -> Result<Vec<ScrobbleArtist>, TransportError> {
    if let Some(code) = value.get("error").and_then(Value::as_u64) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Last.fm request failed")
            .to_string();
        // Error 6 is "not found"; everything else is reported as a bad request
        let status = if code == 6 { 404 } else { 400 };
        return Err(TransportError::Status { status, message });
    }

    let envelope: TopArtistsEnvelope =
        serde_json::from_value(value).map_err(|e| TransportError::Parse(e.to_string()))?;

    // Pages past the end repeat nothing useful
    let total_pages = envelope
        .topartists
        .attr
        .as_ref()
        .and_then(|a| a.total_pages.parse::<u32>().ok());
    if total_pages.is_some_and(|total| page > total) {
        return Ok(Vec::new());
    }

    let artists = envelope
        .topartists
        .artist
        .into_iter()
        .enumerate()
        .map(|(index, dto)| {
            let rank = dto
                .attr
                .and_then(|a| a.rank.parse::<u32>().ok())
                .unwrap_or(index as u32 + 1);
            ScrobbleArtist {
                name: dto.name,
                playcount: dto.playcount.parse().unwrap_or(0),
                rank,
            }
        })
        .collect();

    Ok(artists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_top_artists() {
        let value = json!({
            "topartists": {
                "artist": [
                    {"name": "Alpha", "playcount": "320", "@attr": {"rank": "1"}},
                    {"name": "Beta", "playcount": "80", "@attr": {"rank": "2"}}
                ],
                "@attr": {"page": "1", "totalPages": "1", "total": "2"}
            }
        });

        let artists = parse_top_artists(value, 1).unwrap();
        assert_eq!(artists.len(), 2);
        assert_eq!(artists[0].name, "Alpha");
        assert_eq!(artists[0].playcount, 320);
        assert_eq!(artists[1].rank, 2);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let value = json!({
            "topartists": {
                "artist": [{"name": "Alpha", "playcount": "3", "@attr": {"rank": "1"}}],
                "@attr": {"page": "3", "totalPages": "2"}
            }
        });
        assert!(parse_top_artists(value, 3).unwrap().is_empty());
    }

    #[test]
    fn test_error_envelope_becomes_status() {
        let value = json!({"error": 6, "message": "User not found"});
        match parse_top_artists(value, 1).unwrap_err() {
            TransportError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "User not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct Unused;

    #[async_trait]
    impl Transport for Unused {
        async fn request(
            &self,
            _endpoint: &str,
            _method: Method,
            _token: &str,
            _body: Option<&Value>,
        ) -> Result<Value, TransportError> {
            Err(TransportError::Network("unused".into()))
        }
    }

    #[test]
    fn test_url_encodes_username() {
        let client = LastFmClient::new(Arc::new(Unused), "key");
        let url = client.top_artists_url("some one&x", 2, 200).unwrap();
        assert!(url.starts_with(LASTFM_BASE_URL));
        assert!(url.contains("user=some+one%26x"));
        assert!(url.contains("page=2"));
        assert!(url.contains("method=user.gettopartists"));
    }

    #[test]
    fn test_connector_reuses_client_per_key() {
        let connector = LastFmConnector::new(Arc::new(Unused));

        let first = connector.connect("key-1");
        let again = connector.connect("key-1");
        assert!(Arc::ptr_eq(&first, &again));

        let rotated = connector.connect("key-2");
        assert!(!Arc::ptr_eq(&first, &rotated));
        let current = connector.current.lock().unwrap();
        assert_eq!(current.as_ref().map(|(key, _)| key.as_str()), Some("key-2"));
    }
}
