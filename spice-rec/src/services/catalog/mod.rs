//! Catalog adapters
//!
//! One adapter per upstream music catalog behind the uniform [`CatalogAdapter`]
//! contract. Each adapter normalizes its catalog's response schema at the
//! boundary and maps every failure into the closed [`UpstreamError`] set.

pub mod deezer_client;
pub mod lastfm_client;
mod serde_helpers;
pub mod spotify_client;

pub use deezer_client::DeezerClient;
pub use lastfm_client::LastfmClient;
pub use spotify_client::SpotifyClient;

use crate::models::{CatalogKind, CatalogTrack};
use crate::services::credentials::CredentialError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("spice-rec/", env!("CARGO_PKG_VERSION"));

/// Direct (unkeyed) per-adapter request rate limiter
pub type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build a limiter admitting `per_second` requests per second (minimum 1)
pub fn rate_limiter(per_second: u32) -> DirectRateLimiter {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    governor::RateLimiter::direct(governor::Quota::per_second(rate))
}

/// Shared HTTP client with the per-call upstream timeout applied
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Closed set of catalog call failures
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Caller input rejected, locally or by an upstream 400
    #[error("{catalog}: {message}")]
    Validation { catalog: CatalogKind, message: String },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("{catalog} rate limit exceeded")]
    RateLimited {
        catalog: CatalogKind,
        retry_after: Option<Duration>,
    },

    /// Upstream 4xx other than 400/401/403/429
    #[error("{catalog} request error {status}: {message}")]
    Request {
        catalog: CatalogKind,
        status: u16,
        message: String,
    },

    /// No response within the timeout, or the connection failed
    #[error("{catalog} unavailable: {message}")]
    Unavailable { catalog: CatalogKind, message: String },

    /// 5xx, undecodable body, or anything else unclassified
    #[error("{catalog} upstream error: {message}")]
    Upstream {
        catalog: CatalogKind,
        status: Option<u16>,
        message: String,
    },
}

impl UpstreamError {
    pub fn validation(catalog: CatalogKind, message: impl Into<String>) -> Self {
        UpstreamError::Validation {
            catalog,
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status
    pub fn from_status(
        catalog: CatalogKind,
        status: StatusCode,
        retry_after: Option<Duration>,
        message: String,
    ) -> Self {
        let code = status.as_u16();
        match code {
            400 => UpstreamError::Validation { catalog, message },
            401 | 403 => UpstreamError::Credential(CredentialError::Rejected {
                status: code,
                message,
            }),
            429 => UpstreamError::RateLimited {
                catalog,
                retry_after,
            },
            402..=499 => UpstreamError::Request {
                catalog,
                status: code,
                message,
            },
            _ => UpstreamError::Upstream {
                catalog,
                status: Some(code),
                message,
            },
        }
    }

    /// Map a transport-level failure
    pub fn from_transport(catalog: CatalogKind, error: reqwest::Error) -> Self {
        if error.is_decode() {
            UpstreamError::Upstream {
                catalog,
                status: None,
                message: format!("invalid response body: {}", error),
            }
        } else {
            UpstreamError::Unavailable {
                catalog,
                message: error.to_string(),
            }
        }
    }

    pub fn decode(catalog: CatalogKind, error: impl std::fmt::Display) -> Self {
        UpstreamError::Upstream {
            catalog,
            status: None,
            message: format!("invalid response body: {}", error),
        }
    }

    pub fn is_credential(&self) -> bool {
        matches!(self, UpstreamError::Credential(_))
    }

    /// Failure of the path to the catalog rather than of one item
    ///
    /// True for transport, credential and rate-limit failures.
    pub fn is_path_failure(&self) -> bool {
        matches!(
            self,
            UpstreamError::Unavailable { .. }
                | UpstreamError::Credential(_)
                | UpstreamError::RateLimited { .. }
        )
    }
}

/// Parse a `Retry-After` header given in seconds
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Reject blank queries before any upstream call
pub(crate) fn require_text<'a>(
    catalog: CatalogKind,
    value: &'a str,
    what: &str,
) -> Result<&'a str, UpstreamError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(UpstreamError::validation(catalog, format!("{} cannot be empty", what)))
    } else {
        Ok(trimmed)
    }
}

/// Uniform contract over every upstream music catalog
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    fn kind(&self) -> CatalogKind;

    /// Free-text track search, best match first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, UpstreamError>;

    /// Tracks similar to `artist` / `track`, ordered by the catalog's own weighting
    async fn get_similar(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<CatalogTrack>, UpstreamError>;

    /// This catalog's id for a track, `None` when nothing matches confidently
    async fn convert_id(
        &self,
        name: &str,
        artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError>;
}

const ARTIST_SIMILARITY_THRESHOLD: f64 = 0.8;

fn normalize_name(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a hit's artist plausibly is the requested artist
///
/// Accepts a Jaro-Winkler similarity of at least 0.8 on normalized names, or
/// either name containing the other ("Beatles" vs "The Beatles").
pub fn is_confident_artist_match(expected: &str, found: &str) -> bool {
    let expected = normalize_name(expected);
    let found = normalize_name(found);

    if expected.is_empty() || found.is_empty() {
        return false;
    }

    expected.contains(&found)
        || found.contains(&expected)
        || strsim::jaro_winkler(&expected, &found) >= ARTIST_SIMILARITY_THRESHOLD
}

/// Pick the id of the first hit whose artist matches confidently
///
/// Without an expected artist the top hit is taken as-is.
pub(crate) fn confident_hit_id(hits: &[CatalogTrack], artist: Option<&str>) -> Option<String> {
    let artist = artist.map(str::trim).filter(|a| !a.is_empty());
    hits.iter()
        .find(|hit| artist.map_or(true, |a| is_confident_artist_match(a, &hit.artist)))
        .and_then(|hit| hit.id.clone())
}
