//! Track-level types: user input, catalog hits, seeds and candidates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream catalog a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Lastfm,
    Deezer,
    Spotify,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Lastfm => write!(f, "Last.fm"),
            CatalogKind::Deezer => write!(f, "Deezer"),
            CatalogKind::Spotify => write!(f, "Spotify"),
        }
    }
}

/// Free-text description of a song supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

impl SongDescriptor {
    /// Search phrase from the present fields, in name/artist/album order
    ///
    /// Returns `None` when no field carries text; such descriptors are inert.
    pub fn search_phrase(&self) -> Option<String> {
        let terms: Vec<&str> = [&self.name, &self.artist, &self.album]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .collect();

        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }
}

/// One normalized hit returned by a catalog adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogTrack {
    /// Catalog-native identifier, when the catalog exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub artist: String,
    pub url: String,
    /// Catalog-native similarity weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    /// MusicBrainz recording id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
}

/// Top search hit adopted as a similarity seed
#[derive(Debug, Clone, PartialEq)]
pub struct SeedMatch {
    pub catalog_id: Option<String>,
    pub canonical_name: String,
    pub canonical_artist: String,
    pub source_catalog: CatalogKind,
}

impl SeedMatch {
    pub fn from_hit(hit: CatalogTrack, source_catalog: CatalogKind) -> Self {
        Self {
            catalog_id: hit.id,
            canonical_name: hit.name,
            canonical_artist: hit.artist,
            source_catalog,
        }
    }
}

/// Dedup key: `lowercase(artist) + "_" + lowercase(name)`
pub fn identity_key(artist: &str, name: &str) -> String {
    format!("{}_{}", artist.to_lowercase(), name.to_lowercase())
}

/// A similarity result lifted into the merge pool
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTrack {
    pub identity_key: String,
    pub name: String,
    pub artist: String,
    pub url: String,
    pub match_score: f64,
    pub mbid: Option<String>,
    /// Alternate-catalog id, filled by cross-catalog resolution
    pub external_id: Option<String>,
}

impl CandidateTrack {
    /// Lift a catalog hit at `rank` (0-based) within its seed's result list
    ///
    /// Missing native scores become `100 - rank`.
    pub fn from_catalog(track: CatalogTrack, rank: usize) -> Self {
        let match_score = track
            .match_score
            .unwrap_or_else(|| 100.0 - rank as f64);

        Self {
            identity_key: identity_key(&track.artist, &track.name),
            name: track.name,
            artist: track.artist,
            url: track.url,
            match_score,
            mbid: track.mbid,
            external_id: None,
        }
    }
}
