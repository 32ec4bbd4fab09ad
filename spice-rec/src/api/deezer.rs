//! Deezer endpoints and batch cross-catalog conversion

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::required;
use crate::error::{ApiError, ApiResult};
use crate::models::TrackToConvert;
use crate::services::catalog::deezer_client::{DeezerTrack, MAX_SEARCH_LIMIT};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FindIdParams {
    pub name: Option<String>,
    pub artist: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindIdResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub tracks: Vec<TrackToConvert>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedTrack {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub converted: usize,
    pub total: usize,
    pub tracks: Vec<ConvertedTrack>,
}

/// GET /api/deezer/search/tracks
pub async fn search_tracks(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<DeezerTrack>>> {
    let Query(params) = params?;
    let query = required(params.query, "query")?;
    let tracks = state
        .catalogs
        .deezer
        .search_tracks(&query, params.limit.unwrap_or(MAX_SEARCH_LIMIT))
        .await?;
    Ok(Json(tracks))
}

/// GET /api/deezer/track/find-id
pub async fn find_track_id(
    State(state): State<AppState>,
    params: Result<Query<FindIdParams>, QueryRejection>,
) -> ApiResult<Json<FindIdResponse>> {
    let Query(params) = params?;
    let name = required(params.name, "name")?;
    let artist = params.artist.filter(|a| !a.trim().is_empty());

    let external_id = state
        .catalogs
        .deezer
        .find_track_id(&name, artist.as_deref())
        .await?;

    Ok(Json(FindIdResponse {
        name,
        artist,
        external_id,
    }))
}

/// POST /api/deezer/tracks/convert
///
/// Resolves through the configured resolution catalog.
pub async fn convert_tracks(
    State(state): State<AppState>,
    body: Result<Json<ConvertRequest>, JsonRejection>,
) -> ApiResult<Json<ConvertResponse>> {
    let Json(body) = body?;
    if body.tracks.is_empty() {
        return Err(ApiError::BadRequest("At least one track is required".to_string()));
    }

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let outcome = state.pipeline.convert_batch(&body.tracks, cancel).await?;

    let tracks = body
        .tracks
        .into_iter()
        .zip(outcome.external_ids)
        .map(|(track, external_id)| ConvertedTrack {
            name: track.name,
            artist: track.artist,
            external_id,
        })
        .collect();

    Ok(Json(ConvertResponse {
        converted: outcome.summary.converted,
        total: outcome.summary.total,
        tracks,
    }))
}

/// Build Deezer routes
pub fn deezer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/deezer/search/tracks", get(search_tracks))
        .route("/api/deezer/track/find-id", get(find_track_id))
        .route("/api/deezer/tracks/convert", post(convert_tracks))
}
