//! OAuth client-credentials token provider

use super::{CredentialError, TokenProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh this long before the upstream-declared expiry
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

/// Guarded by the provider mutex
#[derive(Debug, Default)]
struct TokenState {
    token: Option<CachedToken>,
    /// Most recent failed fetch, tagged with its settle number
    last_failure: Option<(u64, CredentialError)>,
}

/// Client-credentials bearer token cache
///
/// The cache mutex is held across the token fetch, so concurrent callers that
/// find no fresh token queue behind one outstanding request and then reuse
/// its result. A failed fetch is shared the same way: callers that were
/// already waiting when it finished get its error instead of issuing their
/// own request. The next caller to arrive afterwards fetches again.
pub struct ClientCredentialsProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    state: Mutex<TokenState>,
    fetches: AtomicU64,
    /// Fetches finished so far, either way
    settled: AtomicU64,
}

impl ClientCredentialsProvider {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            state: Mutex::new(TokenState::default()),
            fetches: AtomicU64::new(0),
            settled: AtomicU64::new(0),
        }
    }

    /// Token requests issued so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn fetch(&self) -> Result<CachedToken, CredentialError> {
        tracing::debug!(token_url = %self.token_url, "Requesting client-credentials token");

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CredentialError::Unavailable(format!("token request failed: {}", e)))?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or(body);

            tracing::warn!(status, message = %message, "Token endpoint refused request");

            return Err(match status {
                401 | 403 => CredentialError::Rejected { status, message },
                _ => CredentialError::Unavailable(format!(
                    "token endpoint returned {}: {}",
                    status, message
                )),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Unavailable(format!("invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in);
        // Short-lived tokens would otherwise be stale on arrival
        let margin = REFRESH_MARGIN.min(lifetime / 2);

        tracing::info!(expires_in = token.expires_in, "Obtained client-credentials token");

        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime - margin,
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsProvider {
    async fn token(&self) -> Result<String, CredentialError> {
        // Fetches settled above this number finished while we waited
        let seen = self.settled.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(token) = state.token.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        if let Some((settled, error)) = &state.last_failure {
            if *settled > seen {
                tracing::debug!(error = %error, "Sharing failure of the token fetch we waited on");
                return Err(error.clone());
            }
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let outcome = self.fetch().await;
        let settled = self.settled.fetch_add(1, Ordering::SeqCst) + 1;

        match outcome {
            Ok(fresh) => {
                let value = fresh.value.clone();
                state.token = Some(fresh);
                state.last_failure = None;
                Ok(value)
            }
            Err(e) => {
                state.last_failure = Some((settled, e.clone()));
                Err(e)
            }
        }
    }

    async fn invalidate(&self, stale: &str) {
        let mut state = self.state.lock().await;
        if state.token.as_ref().is_some_and(|t| t.value == stale) {
            tracing::debug!("Invalidating rejected bearer token");
            state.token = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Loopback URL whose port was just released, so nothing listens on it
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/token", port)
    }

    #[test]
    fn test_cached_token_freshness() {
        let fresh = CachedToken {
            value: "a".into(),
            refresh_at: Instant::now() + Duration::from_secs(30),
        };
        let stale = CachedToken {
            value: "b".into(),
            refresh_at: Instant::now(),
        };
        assert!(fresh.is_fresh());
        assert!(!stale.is_fresh());
    }

    #[tokio::test]
    async fn test_unreachable_token_endpoint_is_unavailable() {
        let provider = ClientCredentialsProvider::new(
            reqwest::Client::new(),
            closed_port_url(),
            "id",
            "secret",
        );

        let err = provider.token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(_)));
        assert!(!err.is_rejection());
        assert_eq!(provider.fetch_count(), 1);

        // A later caller does not inherit the earlier failure
        assert!(provider.token().await.is_err());
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_without_cached_token_is_noop() {
        let provider = ClientCredentialsProvider::new(
            reqwest::Client::new(),
            closed_port_url(),
            "id",
            "secret",
        );
        provider.invalidate("anything").await;
        assert_eq!(provider.fetch_count(), 0);
    }
}
