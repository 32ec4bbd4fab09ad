//! HTTP API handlers for spice-rec

pub mod deezer;
pub mod health;
pub mod lastfm;
pub mod recommendations;
pub mod spotify;

pub use deezer::deezer_routes;
pub use health::health_routes;
pub use lastfm::lastfm_routes;
pub use recommendations::recommendation_routes;
pub use spotify::spotify_routes;

use crate::error::{ApiError, ApiResult};

/// Non-blank value of a required query parameter
pub(crate) fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", name)))
}
