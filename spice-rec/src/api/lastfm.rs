//! Last.fm pass-through endpoints (normalized responses)

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::required;
use crate::error::ApiResult;
use crate::services::catalog::lastfm_client::{
    LastfmArtistInfo, LastfmArtistPage, LastfmTrack, LastfmTrackInfo, LastfmTrackPage,
    MAX_SEARCH_LIMIT,
};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrackInfoParams {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub mbid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtistInfoParams {
    pub artist: Option<String>,
    pub mbid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopTracksParams {
    pub artist: Option<String>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

/// GET /api/lastfm/track/search
pub async fn search_tracks(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<LastfmTrackPage>> {
    let Query(params) = params?;
    let query = required(params.query, "query")?;
    let page = state
        .catalogs
        .lastfm
        .search_tracks(
            &query,
            params.limit.unwrap_or(MAX_SEARCH_LIMIT),
            params.page.unwrap_or(1),
        )
        .await?;
    Ok(Json(page))
}

/// GET /api/lastfm/track/similar
pub async fn similar_tracks(
    State(state): State<AppState>,
    params: Result<Query<SimilarParams>, QueryRejection>,
) -> ApiResult<Json<Vec<LastfmTrack>>> {
    let Query(params) = params?;
    let artist = required(params.artist, "artist")?;
    let track = required(params.track, "track")?;
    let tracks = state
        .catalogs
        .lastfm
        .similar_tracks(&artist, &track, params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    Ok(Json(tracks))
}

/// GET /api/lastfm/track/info
pub async fn track_info(
    State(state): State<AppState>,
    params: Result<Query<TrackInfoParams>, QueryRejection>,
) -> ApiResult<Json<LastfmTrackInfo>> {
    let Query(params) = params?;
    let artist = required(params.artist, "artist")?;
    let track = required(params.track, "track")?;
    let info = state
        .catalogs
        .lastfm
        .track_info(&artist, &track, params.mbid.as_deref())
        .await?;
    Ok(Json(info))
}

/// GET /api/lastfm/artist/info
pub async fn artist_info(
    State(state): State<AppState>,
    params: Result<Query<ArtistInfoParams>, QueryRejection>,
) -> ApiResult<Json<LastfmArtistInfo>> {
    let Query(params) = params?;
    let artist = required(params.artist, "artist")?;
    let info = state
        .catalogs
        .lastfm
        .artist_info(&artist, params.mbid.as_deref())
        .await?;
    Ok(Json(info))
}

/// GET /api/lastfm/artist/search
pub async fn search_artists(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<LastfmArtistPage>> {
    let Query(params) = params?;
    let query = required(params.query, "query")?;
    let page = state
        .catalogs
        .lastfm
        .search_artists(
            &query,
            params.limit.unwrap_or(MAX_SEARCH_LIMIT),
            params.page.unwrap_or(1),
        )
        .await?;
    Ok(Json(page))
}

/// GET /api/lastfm/artist/top-tracks
pub async fn artist_top_tracks(
    State(state): State<AppState>,
    params: Result<Query<TopTracksParams>, QueryRejection>,
) -> ApiResult<Json<Vec<LastfmTrack>>> {
    let Query(params) = params?;
    let artist = required(params.artist, "artist")?;
    let tracks = state
        .catalogs
        .lastfm
        .artist_top_tracks(
            &artist,
            params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            params.page.unwrap_or(1),
        )
        .await?;
    Ok(Json(tracks))
}

/// Build Last.fm pass-through routes
pub fn lastfm_routes() -> Router<AppState> {
    Router::new()
        .route("/api/lastfm/track/search", get(search_tracks))
        .route("/api/lastfm/track/similar", get(similar_tracks))
        .route("/api/lastfm/track/info", get(track_info))
        .route("/api/lastfm/artist/info", get(artist_info))
        .route("/api/lastfm/artist/search", get(search_artists))
        .route("/api/lastfm/artist/top-tracks", get(artist_top_tracks))
}
