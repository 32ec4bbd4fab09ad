//! Token caching, single-flight refresh and bearer retry

mod helpers;

use futures::future::join_all;
use helpers::mock_upstream::{closed_port_url, SpotifyMock, TokenMock};
use spice_rec::services::catalog::UpstreamError;
use spice_rec::services::credentials::{
    ClientCredentialsProvider, CredentialError, TokenProvider,
};
use spice_rec::services::SpotifyClient;
use std::sync::Arc;
use std::time::Duration;

fn provider(token_url: String) -> ClientCredentialsProvider {
    ClientCredentialsProvider::new(reqwest::Client::new(), token_url, "client-id", "client-secret")
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let mock = TokenMock {
        delay: Duration::from_millis(100),
        ..TokenMock::default()
    };
    let hits = mock.hits.clone();
    let provider = Arc::new(provider(mock.start().await));

    let calls = (0..16).map(|_| {
        let provider = provider.clone();
        async move { provider.token().await }
    });
    let tokens: Vec<String> = join_all(calls)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(tokens.iter().all(|t| t == "tok-1"));
    assert_eq!(hits.get(), 1);
    assert_eq!(provider.fetch_count(), 1);
}

#[tokio::test]
async fn test_cached_token_reused() {
    let mock = TokenMock::default();
    let hits = mock.hits.clone();
    let provider = provider(mock.start().await);

    assert_eq!(provider.token().await.unwrap(), "tok-1");
    assert_eq!(provider.token().await.unwrap(), "tok-1");
    assert_eq!(hits.get(), 1);
}

#[tokio::test]
async fn test_token_refreshed_before_expiry() {
    let mock = TokenMock {
        expires_in: 1,
        ..TokenMock::default()
    };
    let provider = provider(mock.start().await);

    assert_eq!(provider.token().await.unwrap(), "tok-1");
    // Margin is capped at half the lifetime, so refresh falls due after 500ms
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(provider.token().await.unwrap(), "tok-2");
}

#[tokio::test]
async fn test_invalidate_only_evicts_matching_token() {
    let provider = provider(TokenMock::default().start().await);

    assert_eq!(provider.token().await.unwrap(), "tok-1");

    provider.invalidate("some-older-token").await;
    assert_eq!(provider.token().await.unwrap(), "tok-1");

    provider.invalidate("tok-1").await;
    assert_eq!(provider.token().await.unwrap(), "tok-2");
}

#[tokio::test]
async fn test_token_endpoint_refusal_is_rejection() {
    let mock = TokenMock {
        refuse_with: Some(401),
        ..TokenMock::default()
    };
    let provider = provider(mock.start().await);

    let err = provider.token().await.unwrap_err();
    assert!(err.is_rejection());
    assert!(err.to_string().contains("Invalid client secret"));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_failed_fetch() {
    let mock = TokenMock {
        delay: Duration::from_millis(200),
        refuse_with: Some(503),
        ..TokenMock::default()
    };
    let hits = mock.hits.clone();
    let provider = Arc::new(provider(mock.start().await));

    let calls = (0..16).map(|_| {
        let provider = provider.clone();
        async move { provider.token().await }
    });
    let results = join_all(calls).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(CredentialError::Unavailable(_)))));
    assert_eq!(hits.get(), 1);
    assert_eq!(provider.fetch_count(), 1);

    // The failure is not cached for callers arriving afterwards
    assert!(provider.token().await.is_err());
    assert_eq!(hits.get(), 2);
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_unavailable() {
    let provider = provider(format!("{}/api/token", closed_port_url()));

    let err = provider.token().await.unwrap_err();
    assert!(matches!(err, CredentialError::Unavailable(_)));
}

#[tokio::test]
async fn test_spotify_retries_once_with_fresh_token() {
    let tokens = TokenMock::default();
    let token_hits = tokens.hits.clone();
    let provider = Arc::new(provider(tokens.start().await));

    // tok-1 is treated as expired upstream; tok-2 works
    let api = SpotifyMock::default()
        .accepting("tok-2")
        .with_track("4iV5W9uYEdYUVa79Axb7Rh", "Creep", "Radiohead");
    let api_hits = api.hits.clone();
    let spotify = SpotifyClient::new(reqwest::Client::new(), provider).with_base_url(api.start().await);

    let tracks = spotify.search_tracks("creep", 10).await.unwrap();

    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].artists, vec!["Radiohead".to_string()]);
    assert_eq!(token_hits.get(), 2);
    assert_eq!(api_hits.get(), 2);
}

#[tokio::test]
async fn test_spotify_persistent_rejection_surfaces_after_one_retry() {
    let provider = Arc::new(provider(TokenMock::default().start().await));

    let api = SpotifyMock::default();
    let api_hits = api.hits.clone();
    let spotify = SpotifyClient::new(reqwest::Client::new(), provider).with_base_url(api.start().await);

    let err = spotify.search_tracks("creep", 10).await.unwrap_err();

    assert!(matches!(
        err,
        UpstreamError::Credential(CredentialError::Rejected { status: 401, .. })
    ));
    assert_eq!(api_hits.get(), 2);
}

#[tokio::test]
async fn test_spotify_warm_up_fetches_token() {
    let tokens = TokenMock::default();
    let hits = tokens.hits.clone();
    let provider = Arc::new(provider(tokens.start().await));
    let spotify = SpotifyClient::new(reqwest::Client::new(), provider);

    spotify.warm_up().await.unwrap();
    assert_eq!(hits.get(), 1);
}
