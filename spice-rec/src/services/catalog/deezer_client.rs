//! Deezer API client
//!
//! Unauthenticated public API. Default alternate catalog for cross-catalog id
//! resolution.

use super::serde_helpers::lenient_id;
use super::{
    is_confident_artist_match, rate_limiter, require_text, retry_after, CatalogAdapter,
    DirectRateLimiter, UpstreamError,
};
use crate::models::{CatalogKind, CatalogTrack};
use crate::services::credentials::CredentialError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEEZER_BASE_URL: &str = "https://api.deezer.com";

/// Deezer allows 50 requests per 5 seconds
const REQUESTS_PER_SECOND: u32 = 10;

pub const MAX_SEARCH_LIMIT: usize = 25;

/// Hits inspected per id lookup query
const LOOKUP_CANDIDATES: usize = 5;

const CATALOG: CatalogKind = CatalogKind::Deezer;

/// Deezer reports failures in-band: `{"error": {"type", "message", "code"}}`
#[derive(Debug, Deserialize)]
struct DeezerErrorReply {
    error: DeezerErrorBody,
}

#[derive(Debug, Deserialize)]
struct DeezerErrorBody {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Default for DataList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WireArtist {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireAlbum {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireTrack {
    #[serde(default, deserialize_with = "lenient_id")]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    preview: Option<String>,
    artist: Option<WireArtist>,
    album: Option<WireAlbum>,
}

impl WireTrack {
    fn artist_name(&self) -> String {
        self.artist.as_ref().map(|a| a.name.clone()).unwrap_or_default()
    }

    fn into_catalog_track(self) -> CatalogTrack {
        CatalogTrack {
            artist: self.artist_name(),
            id: self.id,
            name: self.title,
            url: self.link,
            match_score: None,
            mbid: None,
        }
    }
}

/// Normalized Deezer track for the search pass-through
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeezerTrack {
    pub id: Option<String>,
    pub name: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl From<WireTrack> for DeezerTrack {
    fn from(track: WireTrack) -> Self {
        Self {
            artist: track.artist_name(),
            id: track.id,
            name: track.title,
            album: track.album.and_then(|a| a.title),
            url: track.link,
            duration_secs: track.duration,
            preview_url: track.preview.filter(|p| !p.is_empty()),
        }
    }
}

/// Outcome of mapping a body-level error
enum BodyError {
    /// Code 800: the query matched nothing
    NoData,
    Failed(UpstreamError),
}

fn classify_body_error(code: u32, message: String) -> BodyError {
    BodyError::Failed(match code {
        800 => return BodyError::NoData,
        4 => UpstreamError::RateLimited {
            catalog: CATALOG,
            retry_after: None,
        },
        200 | 300 => UpstreamError::Credential(CredentialError::Rejected {
            status: 403,
            message,
        }),
        500 | 501 | 600 => UpstreamError::Validation {
            catalog: CATALOG,
            message,
        },
        700 => UpstreamError::Unavailable {
            catalog: CATALOG,
            message,
        },
        _ => UpstreamError::Upstream {
            catalog: CATALOG,
            status: None,
            message: format!("error {}: {}", code, message),
        },
    })
}

/// `artist:"..." track:"..."` advanced search expression
fn advanced_query(name: &str, artist: Option<&str>) -> String {
    let escape = |s: &str| s.replace('"', " ");
    match artist {
        Some(artist) => format!("artist:\"{}\" track:\"{}\"", escape(artist), escape(name)),
        None => format!("track:\"{}\"", escape(name)),
    }
}

/// Deezer API client
pub struct DeezerClient {
    http: reqwest::Client,
    base_url: String,
    rate_limiter: DirectRateLimiter,
}

impl DeezerClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEEZER_BASE_URL.to_string(),
            rate_limiter: rate_limiter(REQUESTS_PER_SECOND),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        self.rate_limiter.until_ready().await;
        tracing::debug!(path, "Querying Deezer API");

        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))?;

        let status = response.status();
        let retry = retry_after(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_transport(CATALOG, e))?;

        if let Ok(reply) = serde_json::from_str::<DeezerErrorReply>(&body) {
            let DeezerErrorBody { code, message } = reply.error;
            return match classify_body_error(code, message) {
                BodyError::NoData => Ok(T::default()),
                BodyError::Failed(UpstreamError::RateLimited { catalog, .. }) => {
                    Err(UpstreamError::RateLimited {
                        catalog,
                        retry_after: retry,
                    })
                }
                BodyError::Failed(error) => {
                    tracing::warn!(path, code, error = %error, "Deezer API error");
                    Err(error)
                }
            };
        }

        if !status.is_success() {
            return Err(UpstreamError::from_status(CATALOG, status, retry, body));
        }

        serde_json::from_str(&body).map_err(|e| UpstreamError::decode(CATALOG, e))
    }

    async fn search_wire(&self, query: &str, limit: usize) -> Result<Vec<WireTrack>, UpstreamError> {
        let query = require_text(CATALOG, query, "Search query")?;
        let reply: DataList<WireTrack> = self
            .call(
                "/search/track",
                &[
                    ("q", query.to_string()),
                    ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
                ],
            )
            .await?;
        Ok(reply.data)
    }

    /// Track search; `limit` is capped at 25
    pub async fn search_tracks(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DeezerTrack>, UpstreamError> {
        Ok(self
            .search_wire(query, limit)
            .await?
            .into_iter()
            .map(DeezerTrack::from)
            .collect())
    }

    /// Deezer track id for `name` (and optionally `artist`)
    ///
    /// Tries an advanced field query first, then a loose free-text query.
    /// A hit is accepted only when its artist matches confidently.
    pub async fn find_track_id(
        &self,
        name: &str,
        artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError> {
        let name = require_text(CATALOG, name, "Track name")?;
        let artist = artist.map(str::trim).filter(|a| !a.is_empty());

        let loose = match artist {
            Some(artist) => format!("{} {}", name, artist),
            None => name.to_string(),
        };

        for query in [advanced_query(name, artist), loose] {
            let hits = self.search_wire(&query, LOOKUP_CANDIDATES).await?;
            let found = hits.into_iter().find(|hit| {
                artist.map_or(true, |a| is_confident_artist_match(a, &hit.artist_name()))
            });

            if let Some(id) = found.and_then(|hit| hit.id) {
                tracing::debug!(name, artist, id = %id, "Resolved Deezer track id");
                return Ok(Some(id));
            }
        }

        tracing::debug!(name, artist, "No confident Deezer match");
        Ok(None)
    }
}

#[async_trait]
impl CatalogAdapter for DeezerClient {
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

    /// Seed track's artist radio, in Deezer's order
    async fn get_similar(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<CatalogTrack>, UpstreamError> {
        let artist = require_text(CATALOG, artist, "Artist")?;
        let track = require_text(CATALOG, track, "Track")?;

        let seed = self
            .search_wire(&advanced_query(track, Some(artist)), 1)
            .await?
            .into_iter()
            .next();

        let Some(artist_id) = seed.and_then(|t| t.artist).and_then(|a| a.id) else {
            return Ok(Vec::new());
        };

        let reply: DataList<WireTrack> = self
            .call(
                &format!("/artist/{}/radio", artist_id),
                &[("limit", limit.max(1).to_string())],
            )
            .await?;

        Ok(reply
            .data
            .into_iter()
            .take(limit)
            .map(WireTrack::into_catalog_track)
            .collect())
    }

    async fn convert_id(
        &self,
        name: &str,
        artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError> {
        self.find_track_id(name, artist).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_payload_normalized() {
        let reply: DataList<WireTrack> = serde_json::from_str(
            r#"{"data":[{"id":3135556,"title":"Harder, Better, Faster, Stronger",
                "link":"https://www.deezer.com/track/3135556","duration":224,"preview":"",
                "artist":{"id":27,"name":"Daft Punk"},"album":{"title":"Discovery"}}],
                "total":1}"#,
        )
        .unwrap();

        let track = DeezerTrack::from(reply.data[0].clone());
        assert_eq!(track.id.as_deref(), Some("3135556"));
        assert_eq!(track.artist, "Daft Punk");
        assert_eq!(track.album.as_deref(), Some("Discovery"));
        assert_eq!(track.preview_url, None);
    }

    #[test]
    fn test_body_error_classification() {
        assert!(matches!(classify_body_error(800, "no data".into()), BodyError::NoData));
        assert!(matches!(
            classify_body_error(4, "Quota limit exceeded".into()),
            BodyError::Failed(UpstreamError::RateLimited { .. })
        ));
        assert!(matches!(
            classify_body_error(300, "Invalid token".into()),
            BodyError::Failed(UpstreamError::Credential(_))
        ));
        assert!(matches!(
            classify_body_error(501, "no query".into()),
            BodyError::Failed(UpstreamError::Validation { .. })
        ));
        assert!(matches!(
            classify_body_error(700, "busy".into()),
            BodyError::Failed(UpstreamError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_advanced_query() {
        assert_eq!(
            advanced_query("Yesterday", Some("The Beatles")),
            r#"artist:"The Beatles" track:"Yesterday""#
        );
        assert_eq!(advanced_query("say \"hi\"", None), r#"track:"say  hi ""#);
    }
}
