//! Last.fm API client
//!
//! Primary search and similarity catalog. Authenticated with an API key on
//! every call (signed-request flow); results are normalized into
//! [`CatalogTrack`] and the `Lastfm*` structs below.

use super::serde_helpers::{lenient_f64, lenient_u64, non_empty, OneOrMany};
use super::{
    confident_hit_id, rate_limiter, require_text, retry_after, CatalogAdapter, DirectRateLimiter,
    UpstreamError,
};
use crate::models::{CatalogKind, CatalogTrack};
use crate::services::credentials::{CredentialError, SignedRequestBuilder};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LASTFM_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Requests per second allowed by the Last.fm terms of service
const REQUESTS_PER_SECOND: u32 = 5;

pub const MAX_SEARCH_LIMIT: usize = 30;
pub const MAX_LIST_LIMIT: usize = 1000;

const CATALOG: CatalogKind = CatalogKind::Lastfm;

// ============================================================================
// Wire schema
// ============================================================================

/// Last.fm signals failures as `{"error": <code>, "message": ...}`,
/// sometimes with HTTP 200
#[derive(Debug, Deserialize)]
struct LastfmErrorBody {
    error: u32,
    #[serde(default)]
    message: String,
}

/// Artist is a bare string in search results and an object elsewhere
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArtistRef {
    Name(String),
    Object { name: String },
}

impl ArtistRef {
    fn into_name(self) -> String {
        match self {
            ArtistRef::Name(name) | ArtistRef::Object { name } => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTrack {
    #[serde(default)]
    name: String,
    artist: Option<ArtistRef>,
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "lenient_f64", rename = "match")]
    match_score: Option<f64>,
    #[serde(default, deserialize_with = "non_empty")]
    mbid: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    playcount: Option<u64>,
}

impl WireTrack {
    fn into_catalog_track(self) -> CatalogTrack {
        CatalogTrack {
            id: self.mbid.clone(),
            name: self.name,
            artist: self.artist.map(ArtistRef::into_name).unwrap_or_default(),
            url: self.url,
            match_score: self.match_score,
            mbid: self.mbid,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TrackList {
    #[serde(default)]
    track: OneOrMany<WireTrack>,
}

#[derive(Debug, Deserialize)]
struct TrackSearchReply {
    results: TrackSearchResults,
}

#[derive(Debug, Deserialize)]
struct TrackSearchResults {
    #[serde(default)]
    trackmatches: TrackList,
    #[serde(default, rename = "opensearch:totalResults", deserialize_with = "lenient_u64")]
    total_results: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SimilarReply {
    #[serde(default)]
    similartracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct TopTracksReply {
    #[serde(default)]
    toptracks: TrackList,
}

#[derive(Debug, Default, Deserialize)]
struct TagList {
    #[serde(default)]
    tag: OneOrMany<WireTag>,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Wiki {
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAlbum {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackInfoReply {
    track: WireTrackInfo,
}

#[derive(Debug, Deserialize)]
struct WireTrackInfo {
    name: String,
    artist: Option<ArtistRef>,
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "non_empty")]
    mbid: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    playcount: Option<u64>,
    album: Option<WireAlbum>,
    #[serde(default)]
    toptags: TagList,
    #[serde(default)]
    wiki: Wiki,
}

#[derive(Debug, Deserialize)]
struct ArtistInfoReply {
    artist: WireArtistInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ArtistStats {
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    playcount: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SimilarArtists {
    #[serde(default)]
    artist: OneOrMany<WireArtist>,
}

#[derive(Debug, Deserialize)]
struct WireArtistInfo {
    name: String,
    #[serde(default, deserialize_with = "non_empty")]
    mbid: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    stats: ArtistStats,
    #[serde(default)]
    similar: SimilarArtists,
    #[serde(default)]
    tags: TagList,
    #[serde(default)]
    bio: Wiki,
}

#[derive(Debug, Deserialize)]
struct WireArtist {
    name: String,
    #[serde(default, deserialize_with = "non_empty")]
    mbid: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    listeners: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchReply {
    results: ArtistSearchResults,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResults {
    #[serde(default)]
    artistmatches: SimilarArtists,
    #[serde(default, rename = "opensearch:totalResults", deserialize_with = "lenient_u64")]
    total_results: Option<u64>,
}

// ============================================================================
// Normalized output
// ============================================================================

/// One page of track search results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmTrackPage {
    pub tracks: Vec<LastfmTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
}

/// Track entry with popularity counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmTrack {
    pub name: String,
    pub artist: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listeners: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playcount: Option<u64>,
}

impl From<WireTrack> for LastfmTrack {
    fn from(track: WireTrack) -> Self {
        Self {
            name: track.name,
            artist: track.artist.map(ArtistRef::into_name).unwrap_or_default(),
            url: track.url,
            match_score: track.match_score,
            mbid: track.mbid,
            listeners: track.listeners,
            playcount: track.playcount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmTrackInfo {
    pub name: String,
    pub artist: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listeners: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playcount: Option<u64>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmArtistInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listeners: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playcount: Option<u64>,
    pub similar_artists: Vec<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmArtist {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listeners: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastfmArtistPage {
    pub artists: Vec<LastfmArtist>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
}

fn tag_names(tags: TagList) -> Vec<String> {
    tags.tag.into_vec().into_iter().map(|t| t.name).collect()
}

// ============================================================================
// Client
// ============================================================================

/// Map a Last.fm body-level error code into the closed upstream set
fn classify_body_error(code: u32, message: String) -> UpstreamError {
    match code {
        29 => UpstreamError::RateLimited {
            catalog: CATALOG,
            retry_after: None,
        },
        // Authentication, invalid/suspended key, invalid signature
        4 | 9 | 10 | 13 | 14 | 26 => UpstreamError::Credential(CredentialError::Rejected {
            status: 403,
            message,
        }),
        6 | 7 => UpstreamError::Validation {
            catalog: CATALOG,
            message,
        },
        11 | 16 => UpstreamError::Unavailable {
            catalog: CATALOG,
            message,
        },
        2 | 3 | 5 => UpstreamError::Request {
            catalog: CATALOG,
            status: 400,
            message,
        },
        _ => UpstreamError::Upstream {
            catalog: CATALOG,
            status: None,
            message: format!("error {}: {}", code, message),
        },
    }
}

/// Last.fm API client
pub struct LastfmClient {
    http: reqwest::Client,
    base_url: String,
    signer: SignedRequestBuilder,
    application_name: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl LastfmClient {
    pub fn new(http: reqwest::Client, signer: SignedRequestBuilder) -> Self {
        Self {
            http,
            base_url: LASTFM_BASE_URL.to_string(),
            signer,
            application_name: None,
            rate_limiter: rate_limiter(REQUESTS_PER_SECOND),
        }
    }

    /// Point at a different API root (tests, proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Identify the registered application in the User-Agent
    pub fn with_application_name(mut self, name: Option<String>) -> Self {
        self.application_name = name;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.insert("method".to_string(), method.to_string());
        query.insert("format".to_string(), "json".to_string());

        let query_string = self.signer.build(&query, false)?;
        let url = format!("{}?{}", self.base_url, query_string);

        self.rate_limiter.until_ready().await;
        tracing::debug!(method, "Querying Last.fm API");

        let mut request = self.http.get(&url);
        if let Some(name) = &self.application_name {
            request = request.header(reqwest::header::USER_AGENT, name.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))?;

        let status = response.status();
        let retry = retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))?;

        if let Ok(error) = serde_json::from_str::<LastfmErrorBody>(&body) {
            tracing::warn!(method, code = error.error, message = %error.message, "Last.fm API error");
            return Err(match classify_body_error(error.error, error.message) {
                UpstreamError::RateLimited { catalog, .. } => UpstreamError::RateLimited {
                    catalog,
                    retry_after: retry,
                },
                other => other,
            });
        }

        if !status.is_success() {
            return Err(UpstreamError::from_status(CATALOG, status, retry, body));
        }

        serde_json::from_str(&body).map_err(|e| UpstreamError::decode(CATALOG, e))
    }

    /// `track.search`; `limit` is capped at 30
    pub async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
        page: usize,
    ) -> Result<LastfmTrackPage, UpstreamError> {
        let query = require_text(CATALOG, query, "Search query")?;
        let reply: TrackSearchReply = self
            .call(
                "track.search",
                &[
                    ("track", query.to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                    ("page", page.max(1).to_string()),
                ],
            )
            .await?;

        Ok(LastfmTrackPage {
            tracks: reply
                .results
                .trackmatches
                .track
                .into_vec()
                .into_iter()
                .map(LastfmTrack::from)
                .collect(),
            total_results: reply.results.total_results,
        })
    }

    async fn similar_wire(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<WireTrack>, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let track = require_text(CATALOG, track, "Track")?;
        let reply: SimilarReply = self
            .call(
                "track.getSimilar",
                &[
                    ("artist", artist.to_string()),
                    ("track", track.to_string()),
                    ("limit", limit.clamp(1, MAX_LIST_LIMIT).to_string()),
                ],
            )
            .await?;
        Ok(reply.similartracks.track.into_vec())
    }

    /// `track.getSimilar`; `limit` is capped at 1000
    pub async fn similar_tracks(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<LastfmTrack>, UpstreamError> {
        Ok(self
            .similar_wire(artist, track, limit)
            .await?
            .into_iter()
            .map(LastfmTrack::from)
            .collect())
    }

    /// `track.getInfo`
    pub async fn track_info(
        &self,
        artist: &str,
        track: &str,
        mbid: Option<&str>,
    ) -> Result<LastfmTrackInfo, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let track = require_text(CATALOG, track, "Track")?;
        let mut params = vec![("artist", artist.to_string()), ("track", track.to_string())];
        if let Some(mbid) = mbid.filter(|m| !m.trim().is_empty()) {
            params.push(("mbid", mbid.to_string()));
        }

        let info = self.call::<TrackInfoReply>("track.getInfo", &params).await?.track;
        Ok(LastfmTrackInfo {
            name: info.name,
            artist: info.artist.map(ArtistRef::into_name).unwrap_or_default(),
            url: info.url,
            mbid: info.mbid,
            album: info.album.and_then(|a| a.title),
            duration_ms: info.duration.filter(|d| *d > 0),
            listeners: info.listeners,
            playcount: info.playcount,
            tags: tag_names(info.toptags),
            summary: info.wiki.summary,
        })
    }

    /// `artist.getInfo`
    pub async fn artist_info(
        &self,
        artist: &str,
        mbid: Option<&str>,
    ) -> Result<LastfmArtistInfo, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let mut params = vec![("artist", artist.to_string())];
        if let Some(mbid) = mbid.filter(|m| !m.trim().is_empty()) {
            params.push(("mbid", mbid.to_string()));
        }

        let info = self.call::<ArtistInfoReply>("artist.getInfo", &params).await?.artist;
        Ok(LastfmArtistInfo {
            name: info.name,
            mbid: info.mbid,
            url: info.url,
            listeners: info.stats.listeners,
            playcount: info.stats.playcount,
            similar_artists: info
                .similar
                .artist
                .into_vec()
                .into_iter()
                .map(|a| a.name)
                .collect(),
            tags: tag_names(info.tags),
            summary: info.bio.summary,
        })
    }

    /// `artist.search`; `limit` is capped at 30
    pub async fn search_artists(
        &self,
        query: &str,
        limit: usize,
        page: usize,
    ) -> Result<LastfmArtistPage, UpstreamError> {
        let query = require_text(CATALOG, query, "Search query")?;
        let reply: ArtistSearchReply = self
            .call(
                "artist.search",
                &[
                    ("artist", query.to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                    ("page", page.max(1).to_string()),
                ],
            )
            .await?;

        Ok(LastfmArtistPage {
            artists: reply
                .results
                .artistmatches
                .artist
                .into_vec()
                .into_iter()
                .map(|a| LastfmArtist {
                    name: a.name,
                    mbid: a.mbid,
                    url: a.url,
                    listeners: a.listeners,
                })
                .collect(),
            total_results: reply.results.total_results,
        })
    }

    /// `artist.getTopTracks`; `limit` is capped at 1000
    pub async fn artist_top_tracks(
        &self,
        artist: &str,
        limit: usize,
        page: usize,
    ) -> Result<Vec<LastfmTrack>, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let reply: TopTracksReply = self
            .call(
                "artist.getTopTracks",
                &[
                    ("artist", artist.to_string()),
                    ("limit", limit.clamp(1, MAX_LIST_LIMIT).to_string()),
                    ("page", page.max(1).to_string()),
                ],
            )
            .await?;

        Ok(reply
            .toptracks
            .track
            .into_vec()
            .into_iter()
            .map(LastfmTrack::from)
            .collect())
    }
}

#[async_trait]
impl CatalogAdapter for LastfmClient {
    fn kind(&self) -> CatalogKind {
        CATALOG
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, UpstreamError> {
        let query = require_text(CATALOG, query, "Search query")?;
        let reply: TrackSearchReply = self
            .call(
                "track.search",
                &[
                    ("track", query.to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                    ("page", "1".to_string()),
                ],
            )
            .await?;

        Ok(reply
            .results
            .trackmatches
            .track
            .into_vec()
            .into_iter()
            .map(WireTrack::into_catalog_track)
            .collect())
    }

    async fn get_similar(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<CatalogTrack>, UpstreamError> {
        Ok(self
            .similar_wire(artist, track, limit)
            .await?
            .into_iter()
            .map(WireTrack::into_catalog_track)
            .collect())
    }

    /// Last.fm identifies recordings by MusicBrainz id
    async fn convert_id(
        &self,
        name: &str,
        artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError> {
        let phrase = match artist.map(str::trim).filter(|a| !a.is_empty()) {
            Some(artist) => format!("{} {}", name.trim(), artist),
            None => name.trim().to_string(),
        };
        let hits = self.search(&phrase, 5).await?;
        Ok(confident_hit_id(&hits, artist))
    }
}
