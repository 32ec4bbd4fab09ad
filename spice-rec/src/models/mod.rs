//! Domain models for the recommendation pipeline
//!
//! Everything here is request-scoped: built while serving one request and
//! dropped with the response.

pub mod recommendation;
pub mod track;

pub use recommendation::{
    ConversionSummary, DiversityMode, RecommendationRequest, RecommendationResult,
    TrackToConvert, DEFAULT_LIMIT, MAX_LIMIT,
};
pub use track::{identity_key, CandidateTrack, CatalogKind, CatalogTrack, SeedMatch, SongDescriptor};
