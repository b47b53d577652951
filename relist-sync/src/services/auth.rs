//! Authorization gate
//!
//! The engine never performs the OAuth flow itself. Before a run starts the
//! caller asks the [`AuthProvider`] to authorize the run for the scopes its
//! settings need; during the run the provider supplies the bearer token.

use crate::error::SyncError;
use async_trait::async_trait;
use relist_common::models::ArtistSource;

pub const SCOPE_FOLLOW_READ: &str = "user-follow-read";
pub const SCOPE_LIBRARY_READ: &str = "user-library-read";
pub const SCOPE_TOP_READ: &str = "user-top-read";

/// Credentials for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub token: String,
}

/// Supplies catalog credentials
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_auth_data(&self) -> Result<AuthData, SyncError>;

    /// Gate run once before the orchestrator starts
    ///
    /// Returns [`SyncError::Authorization`] when the grant lacks a scope or was
    /// declined.
    async fn authorize(&self, action: &str, scopes: &[&'static str]) -> Result<(), SyncError>;
}

/// Scopes a run needs for the given sources, deduplicated and sorted
pub fn sync_scopes(sources: &[ArtistSource], smart_sort: bool) -> Vec<&'static str> {
    let mut scopes: Vec<&'static str> = sources
        .iter()
        .map(|source| match source {
            ArtistSource::Followed => SCOPE_FOLLOW_READ,
            ArtistSource::SavedTracks | ArtistSource::SavedAlbums => SCOPE_LIBRARY_READ,
        })
        .collect();
    if smart_sort {
        scopes.push(SCOPE_TOP_READ);
    }
    scopes.sort_unstable();
    scopes.dedup();
    scopes
}

/// Pre-issued bearer token with a fixed granted scope set
///
/// An empty `granted` list means the grant is unknown and every scope is
/// assumed present.
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: String,
    granted: Vec<String>,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            granted: Vec::new(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted = scopes.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn get_auth_data(&self) -> Result<AuthData, SyncError> {
        if self.token.trim().is_empty() {
            return Err(SyncError::Authorization("no access token configured".to_string()));
        }
        Ok(AuthData {
            token: self.token.clone(),
        })
    }

    async fn authorize(&self, action: &str, scopes: &[&'static str]) -> Result<(), SyncError> {
        self.get_auth_data().await?;

        if self.granted.is_empty() {
            return Ok(());
        }
        let missing: Vec<&str> = scopes
            .iter()
            .copied()
            .filter(|scope| !self.granted.iter().any(|g| g == scope))
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::Authorization(format!(
                "{} requires scopes not granted: {}",
                action,
                missing.join(", ")
            )));
        }

        tracing::debug!(action, scopes = ?scopes, "Authorization granted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_scopes_are_deduplicated() {
        let scopes = sync_scopes(
            &[
                ArtistSource::SavedTracks,
                ArtistSource::Followed,
                ArtistSource::SavedAlbums,
            ],
            true,
        );
        assert_eq!(
            scopes,
            vec![SCOPE_FOLLOW_READ, SCOPE_LIBRARY_READ, SCOPE_TOP_READ]
        );

        assert_eq!(sync_scopes(&[ArtistSource::Followed], false), vec![SCOPE_FOLLOW_READ]);
    }

    #[tokio::test]
    async fn test_missing_scope_is_declined() {
        let auth = StaticTokenAuth::new("token").with_scopes([SCOPE_FOLLOW_READ]);
        assert!(auth.authorize("sync", &[SCOPE_FOLLOW_READ]).await.is_ok());

        let err = auth
            .authorize("sync", &[SCOPE_FOLLOW_READ, SCOPE_TOP_READ])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Authorization(ref m) if m.contains(SCOPE_TOP_READ)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected() {
        let auth = StaticTokenAuth::new("  ");
        assert!(matches!(
            auth.get_auth_data().await,
            Err(SyncError::Authorization(_))
        ));
    }
}
