//! Spotify endpoints
//!
//! - `GET /api/spotify/search/tracks`
//! - `GET /api/spotify/recommendations`
//! - `POST /api/spotify/recommendations/from-search`
//! - `POST /api/spotify/recommendations/spice-up`
//!
//! Every route answers 503 when Spotify credentials are not configured.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::recommendations::SpiceUpRequest;
use super::required;
use crate::error::{ApiError, ApiResult};
use crate::models::DiversityMode;
use crate::services::catalog::spotify_client::{
    RecommendationQuery, RecommendationSeed, SpotifyRecommendations, SpotifyTrack,
    DEFAULT_RECOMMENDATION_LIMIT, DEFAULT_SEARCH_LIMIT,
};
use crate::services::{SpotifyClient, SpotifyRecommender};
use crate::AppState;

fn not_configured() -> ApiError {
    ApiError::Unavailable("Spotify is not configured".to_string())
}

fn spotify(state: &AppState) -> ApiResult<&Arc<SpotifyClient>> {
    state.catalogs.spotify.as_ref().ok_or_else(not_configured)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/spotify/search/tracks
pub async fn search_tracks(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<SpotifyTrack>>> {
    let Query(params) = params?;
    let query = required(params.query, "query")?;

    let tracks = spotify(&state)?
        .search_tracks(&query, params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await?;
    Ok(Json(tracks))
}

fn id_list(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build a recommendation query from raw query-string pairs
///
/// Seed lists are comma separated. Keys prefixed `target_`, `min_` or `max_`
/// must be numeric and are forwarded as audio-feature tunables; other
/// unknown keys are ignored.
fn recommendation_query(params: &HashMap<String, String>) -> ApiResult<RecommendationQuery> {
    let limit = params
        .get("limit")
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ApiError::BadRequest(format!("limit must be a positive integer, got '{}'", v)))
        })
        .transpose()?;

    let mut query = RecommendationQuery {
        seed_tracks: id_list(params.get("seed_tracks")),
        seed_artists: id_list(params.get("seed_artists")),
        seed_genres: id_list(params.get("seed_genres")),
        market: params
            .get("market")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        limit,
        ..RecommendationQuery::default()
    };

    for (key, value) in params {
        if !["target_", "min_", "max_"].iter().any(|p| key.starts_with(*p)) {
            continue;
        }
        let number = value
            .trim()
            .parse::<f64>()
            .map_err(|_| ApiError::BadRequest(format!("{} must be a number, got '{}'", key, value)))?;
        query.tunables.insert(key.clone(), number);
    }

    Ok(query)
}

/// GET /api/spotify/recommendations
pub async fn recommendations(
    State(state): State<AppState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<SpotifyRecommendations>> {
    let Query(params) = params?;
    let client = spotify(&state)?;
    let query = recommendation_query(&params)?;
    Ok(Json(client.recommendations(&query).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromSearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

/// POST /api/spotify/recommendations/from-search
///
/// Seeds from the top search hit with mildly upbeat targets.
pub async fn recommendations_from_search(
    State(state): State<AppState>,
    body: Result<Json<FromSearchRequest>, JsonRejection>,
) -> ApiResult<Json<SpotifyRecommendations>> {
    let Json(body) = body?;
    let client = spotify(&state)?;

    let seed = client
        .search_tracks(&body.query, 1)
        .await?
        .into_iter()
        .next()
        .and_then(|track| track.id)
        .ok_or_else(|| ApiError::NotFound("No tracks found".to_string()))?;

    tracing::debug!(seed = %seed, "Seeding recommendations from search hit");

    let query = RecommendationQuery {
        seed_tracks: vec![seed],
        limit: Some(body.limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)),
        ..RecommendationQuery::default()
    }
    .with_tunable("target_danceability", 0.6)
    .with_tunable("target_popularity", 60.0);

    Ok(Json(client.recommendations(&query).await?))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotifySpiceUpResponse {
    pub mode: DiversityMode,
    pub input_songs: usize,
    pub found_songs: usize,
    pub recommendations: Vec<SpotifyTrack>,
    pub seeds: Vec<RecommendationSeed>,
}

/// POST /api/spotify/recommendations/spice-up
pub async fn spice_up(
    State(state): State<AppState>,
    body: Result<Json<SpiceUpRequest>, JsonRejection>,
) -> ApiResult<Json<SpotifySpiceUpResponse>> {
    let Json(body) = body?;
    let recommender: &SpotifyRecommender =
        state.spotify_recommender.as_ref().ok_or_else(not_configured)?;
    let request = body.into_pipeline_request(false)?;

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let result = recommender.spice_up(request, cancel).await?;
    Ok(Json(SpotifySpiceUpResponse {
        mode: result.mode,
        input_songs: result.input_song_count,
        found_songs: result.matched_seed_count,
        recommendations: result.recommendations,
        seeds: result.seeds,
    }))
}

/// Build Spotify routes
pub fn spotify_routes() -> Router<AppState> {
    Router::new()
        .route("/api/spotify/search/tracks", get(search_tracks))
        .route("/api/spotify/recommendations", get(recommendations))
        .route(
            "/api/spotify/recommendations/from-search",
            post(recommendations_from_search),
        )
        .route("/api/spotify/recommendations/spice-up", post(spice_up))
}
