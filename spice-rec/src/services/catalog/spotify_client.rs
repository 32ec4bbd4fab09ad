//! Spotify Web API client
//!
//! Bearer-token flow through a shared [`TokenProvider`]. A call rejected with
//! 401/403 invalidates the token and is retried exactly once with a fresh one.

use super::{
    confident_hit_id, rate_limiter, require_text, retry_after, CatalogAdapter, DirectRateLimiter,
    UpstreamError,
};
use crate::models::{CatalogKind, CatalogTrack};
use crate::services::credentials::{CredentialError, TokenProvider};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

const REQUESTS_PER_SECOND: u32 = 10;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 20;
const MAX_RECOMMENDATION_LIMIT: usize = 100;

/// Sent when the caller sets no target of its own
const DEFAULT_TARGET_DANCEABILITY: f64 = 0.5;
const DEFAULT_TARGET_POPULARITY: f64 = 50.0;

const CATALOG: CatalogKind = CatalogKind::Spotify;

#[derive(Debug, Deserialize)]
struct SpotifyErrorReply {
    error: SpotifyErrorBody,
}

#[derive(Debug, Deserialize)]
struct SpotifyErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireArtist {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireAlbum {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<WireArtist>,
    album: Option<WireAlbum>,
    #[serde(default)]
    external_urls: ExternalUrls,
    duration_ms: Option<u64>,
    popularity: Option<u32>,
    preview_url: Option<String>,
}

impl WireTrack {
    fn primary_artist(&self) -> String {
        self.artists.first().map(|a| a.name.clone()).unwrap_or_default()
    }

    fn into_catalog_track(self) -> CatalogTrack {
        CatalogTrack {
            artist: self.primary_artist(),
            id: self.id,
            name: self.name,
            url: self.external_urls.spotify,
            match_score: None,
            mbid: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl<T> Default for Paging<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    #[serde(default)]
    tracks: Paging<WireTrack>,
}

#[derive(Debug, Deserialize)]
struct RecommendationsReply {
    #[serde(default)]
    seeds: Vec<RecommendationSeed>,
    #[serde(default)]
    tracks: Vec<WireTrack>,
}

/// How one seed fed the recommendation pool, as reported upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSeed {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_pool_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_filtering_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_relinking_size: Option<u32>,
}

/// Seeded recommendation request
///
/// Seeds are Spotify ids (genre names for `seed_genres`). `tunables` carries
/// the `target_*`, `min_*` and `max_*` audio-feature parameters verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationQuery {
    pub seed_tracks: Vec<String>,
    pub seed_artists: Vec<String>,
    pub seed_genres: Vec<String>,
    pub market: Option<String>,
    pub limit: Option<usize>,
    pub tunables: BTreeMap<String, f64>,
}

impl RecommendationQuery {
    pub fn has_seeds(&self) -> bool {
        !(self.seed_tracks.is_empty() && self.seed_artists.is_empty() && self.seed_genres.is_empty())
    }

    pub fn with_tunable(mut self, name: &str, value: f64) -> Self {
        self.tunables.insert(name.to_string(), value);
        self
    }

    fn to_params(&self) -> Vec<(&str, String)> {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)
            .clamp(1, MAX_RECOMMENDATION_LIMIT);
        let mut params = vec![("limit", limit.to_string())];

        for (key, ids) in [
            ("seed_tracks", &self.seed_tracks),
            ("seed_artists", &self.seed_artists),
            ("seed_genres", &self.seed_genres),
        ] {
            if !ids.is_empty() {
                params.push((key, ids.join(",")));
            }
        }
        if let Some(market) = &self.market {
            params.push(("market", market.clone()));
        }

        for (name, value) in &self.tunables {
            params.push((name.as_str(), value.to_string()));
        }
        if !self.tunables.contains_key("target_danceability") {
            params.push(("target_danceability", DEFAULT_TARGET_DANCEABILITY.to_string()));
        }
        if !self.tunables.contains_key("target_popularity") {
            params.push(("target_popularity", DEFAULT_TARGET_POPULARITY.to_string()));
        }

        params
    }
}

/// Recommendation tracks plus the seeds that produced them
#[derive(Debug, Clone, Serialize)]
pub struct SpotifyRecommendations {
    pub seeds: Vec<RecommendationSeed>,
    pub tracks: Vec<SpotifyTrack>,
}

/// Ids taken from the best search hit for a seed song
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifySeed {
    pub track_id: String,
    pub artist_ids: Vec<String>,
}

/// Normalized Spotify track for the search pass-through
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub name: String,
    pub artists: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl From<WireTrack> for SpotifyTrack {
    fn from(track: WireTrack) -> Self {
        Self {
            id: track.id,
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album: track.album.map(|a| a.name),
            url: track.external_urls.spotify,
            duration_ms: track.duration_ms,
            popularity: track.popularity,
            preview_url: track.preview_url,
        }
    }
}

/// Spotify Web API client
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    rate_limiter: DirectRateLimiter,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            base_url: SPOTIFY_API_URL.to_string(),
            tokens,
            rate_limiter: rate_limiter(REQUESTS_PER_SECOND),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch a token now so the first request does not pay for it
    pub async fn warm_up(&self) -> Result<(), CredentialError> {
        self.tokens.token().await.map(|_| ())
    }

    async fn get_with_token<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        self.rate_limiter.until_ready().await;
        tracing::debug!(path, "Querying Spotify API");

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SpotifyErrorReply>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(UpstreamError::from_status(CATALOG, status, retry, message));
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))
    }

    /// Authenticated GET with one forced token refresh on rejection
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let token = self.tokens.token().await?;

        match self.get_with_token(&token, path, params).await {
            Err(UpstreamError::Credential(CredentialError::Rejected { status, .. })) => {
                tracing::info!(status, "Spotify rejected bearer token, refreshing once");
                self.tokens.invalidate(&token).await;
                let fresh = self.tokens.token().await?;
                self.get_with_token(&fresh, path, params).await
            }
            other => other,
        }
    }

    async fn search_wire(&self, query: &str, limit: usize) -> Result<Vec<WireTrack>, UpstreamError> {
        let query = require_text(CATALOG, query, "Search query")?;
        let reply: SearchReply = self
            .get(
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", "track".to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                ],
            )
            .await?;
        Ok(reply.tracks.items)
    }

    /// Track search; `limit` is capped at 50
    pub async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SpotifyTrack>, UpstreamError> {
        Ok(self
            .search_wire(query, limit)
            .await?
            .into_iter()
            .map(SpotifyTrack::from)
            .collect())
    }

    /// Track and artist ids of the top hit for `query`, if any
    pub async fn find_seed(&self, query: &str) -> Result<Option<SpotifySeed>, UpstreamError> {
        let top = self.search_wire(query, 1).await?.into_iter().next();
        Ok(top.and_then(|track| {
            let artist_ids = track.artists.into_iter().filter_map(|a| a.id).collect();
            track.id.map(|track_id| SpotifySeed {
                track_id,
                artist_ids,
            })
        }))
    }

    /// GET /recommendations; at least one seed is required
    pub async fn recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<SpotifyRecommendations, UpstreamError> {
        if !query.has_seeds() {
            return Err(UpstreamError::validation(
                CATALOG,
                "At least one seed (tracks, artists, or genres) is required",
            ));
        }

        let params = query.to_params();
        tracing::debug!(
            seed_tracks = query.seed_tracks.len(),
            seed_artists = query.seed_artists.len(),
            seed_genres = query.seed_genres.len(),
            "Requesting Spotify recommendations"
        );

        let reply: RecommendationsReply = self.get("/recommendations", &params).await?;
        Ok(SpotifyRecommendations {
            seeds: reply.seeds,
            tracks: reply.tracks.into_iter().map(SpotifyTrack::from).collect(),
        })
    }
}

fn field_query(name: &str, artist: Option<&str>) -> String {
    match artist {
        Some(artist) => format!("track:{} artist:{}", name, artist),
        None => format!("track:{}", name),
    }
}

#[async_trait]
impl CatalogAdapter for SpotifyClient {
    fn kind(&self) -> CatalogKind {
        CATALOG
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, UpstreamError> {
        Ok(self
            .search_wire(query, limit)
            .await?
            .into_iter()
            .map(WireTrack::into_catalog_track)
            .collect())
    }

    /// Recommendations seeded with the best search hit for the track
    async fn get_similar(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<CatalogTrack>, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let track = require_text(CATALOG, track, "Track")?;

        let seed_id = self
            .search_wire(&field_query(track, Some(artist)), 1)
            .await?
            .into_iter()
            .next()
            .and_then(|t| t.id);

        let Some(seed_id) = seed_id else {
            return Ok(Vec::new());
        };

        let reply: RecommendationsReply = self
            .get(
                "/recommendations",
                &[
                    ("seed_tracks", seed_id),
                    ("limit", limit.clamp(1, MAX_RECOMMENDATION_LIMIT).to_string()),
                ],
            )
            .await?;

        Ok(reply
            .tracks
            .into_iter()
            .map(WireTrack::into_catalog_track)
            .collect())
    }

    async fn convert_id(
        &self,
        name: &str,
        artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError> {
        let name = require_text(CATALOG, name, "Track name")?;
        let artist = artist.map(str::trim).filter(|a| !a.is_empty());
        let hits = self.search(&field_query(name, artist), 5).await?;
        Ok(confident_hit_id(&hits, artist))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_payload_normalized() {
        let reply: SearchReply = serde_json::from_str(
            r#"{"tracks":{"items":[{"id":"4uLU6hMCjMI75M1A2tKUQC","name":"Never Gonna Give You Up",
                "artists":[{"id":"0gxy","name":"Rick Astley"}],"album":{"name":"Whenever You Need Somebody"},
                "external_urls":{"spotify":"https://open.spotify.com/track/4uLU"},
                "duration_ms":213573,"popularity":80,"preview_url":null}],"total":1}}"#,
        )
        .unwrap();

        let track = SpotifyTrack::from(reply.tracks.items.into_iter().next().unwrap());
        assert_eq!(track.artists, vec!["Rick Astley".to_string()]);
        assert_eq!(track.album.as_deref(), Some("Whenever You Need Somebody"));
        assert_eq!(track.url, "https://open.spotify.com/track/4uLU");
        assert_eq!(track.preview_url, None);
    }

    #[test]
    fn test_recommendation_params_fill_default_targets() {
        let query = RecommendationQuery {
            seed_tracks: vec!["a".into(), "b".into()],
            limit: Some(500),
            ..RecommendationQuery::default()
        }
        .with_tunable("target_popularity", 60.0)
        .with_tunable("min_energy", 0.3);

        let params: BTreeMap<&str, String> = query.to_params().into_iter().collect();
        assert_eq!(params["limit"], "100");
        assert_eq!(params["seed_tracks"], "a,b");
        assert!(!params.contains_key("seed_artists"));
        assert_eq!(params["target_popularity"], "60");
        assert_eq!(params["target_danceability"], "0.5");
        assert_eq!(params["min_energy"], "0.3");
    }

    #[test]
    fn test_recommendations_reply_keeps_seeds() {
        let reply: RecommendationsReply = serde_json::from_str(
            r#"{"seeds":[{"id":"4uLU","type":"TRACK","href":"https://api.spotify.com/v1/tracks/4uLU",
                "initialPoolSize":250,"afterFilteringSize":120,"afterRelinkingSize":120}],"tracks":[]}"#,
        )
        .unwrap();

        assert_eq!(reply.seeds[0].kind, "TRACK");
        assert_eq!(reply.seeds[0].after_filtering_size, Some(120));
        let rendered = serde_json::to_value(&reply.seeds[0]).unwrap();
        assert_eq!(rendered["type"], "TRACK");
        assert_eq!(rendered["initialPoolSize"], 250);
    }

    #[test]
    fn test_field_query() {
        assert_eq!(field_query("Creep", Some("Radiohead")), "track:Creep artist:Radiohead");
        assert_eq!(field_query("Creep", None), "track:Creep");
    }
}
