//! Recommendation endpoints
//!
//! - `POST /api/lastfm/recommendations/spice-up`
//! - `POST /api/lastfm/recommendations/spice-up-with-deezer`

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::{
    CandidateTrack, ConversionSummary, DiversityMode, RecommendationRequest, RecommendationResult,
    SongDescriptor, MAX_LIMIT,
};
use crate::AppState;

/// Body of `spice-up`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiceUpRequest {
    pub songs: Vec<SongDescriptor>,
    pub limit: Option<usize>,
    pub mode: Option<DiversityMode>,
}

/// Body of `spice-up-with-deezer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiceUpWithConversionRequest {
    #[serde(flatten)]
    pub base: SpiceUpRequest,
    pub convert_to_deezer: Option<bool>,
}

impl SpiceUpRequest {
    pub(crate) fn into_pipeline_request(self, convert: bool) -> ApiResult<RecommendationRequest> {
        if self.songs.is_empty() {
            return Err(ApiError::BadRequest("At least one song is required".to_string()));
        }

        let mut request = RecommendationRequest::new(self.songs)
            .with_mode(self.mode.unwrap_or_default())
            .with_conversion(convert);

        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(ApiError::BadRequest(format!(
                    "limit must be between 1 and {}",
                    MAX_LIMIT
                )));
            }
            request = request.with_limit(limit);
        }

        Ok(request)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDto {
    pub name: String,
    pub artist: String,
    pub url: String,
    pub match_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbid: Option<String>,
    /// Outer `None` omits the field; `Some(None)` renders `null`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiceUpResponse {
    pub mode: DiversityMode,
    pub input_songs: usize,
    pub found_songs: usize,
    pub recommendations: Vec<RecommendationDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_summary: Option<ConversionSummary>,
}

fn to_dto(candidate: CandidateTrack, with_external_id: bool) -> RecommendationDto {
    RecommendationDto {
        name: candidate.name,
        artist: candidate.artist,
        url: candidate.url,
        match_score: candidate.match_score,
        mbid: candidate.mbid,
        external_id: with_external_id.then_some(candidate.external_id),
    }
}

impl From<RecommendationResult> for SpiceUpResponse {
    fn from(result: RecommendationResult) -> Self {
        let converted = result.conversion_summary.is_some();
        Self {
            mode: result.mode,
            input_songs: result.input_song_count,
            found_songs: result.matched_seed_count,
            recommendations: result
                .recommendations
                .into_iter()
                .map(|c| to_dto(c, converted))
                .collect(),
            conversion_summary: result.conversion_summary,
        }
    }
}

async fn run_pipeline(state: &AppState, request: RecommendationRequest) -> ApiResult<SpiceUpResponse> {
    // Dropping the handler future (client disconnect) cancels outstanding calls
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let result = state.pipeline.run(request, cancel).await?;
    Ok(SpiceUpResponse::from(result))
}

/// POST /api/lastfm/recommendations/spice-up
pub async fn spice_up(
    State(state): State<AppState>,
    body: Result<Json<SpiceUpRequest>, JsonRejection>,
) -> ApiResult<Json<SpiceUpResponse>> {
    let Json(body) = body?;
    let request = body.into_pipeline_request(false)?;
    Ok(Json(run_pipeline(&state, request).await?))
}

/// POST /api/lastfm/recommendations/spice-up-with-deezer
pub async fn spice_up_with_conversion(
    State(state): State<AppState>,
    body: Result<Json<SpiceUpWithConversionRequest>, JsonRejection>,
) -> ApiResult<Json<SpiceUpResponse>> {
    let Json(body) = body?;
    let convert = body.convert_to_deezer.unwrap_or(true);
    let request = body.base.into_pipeline_request(convert)?;
    Ok(Json(run_pipeline(&state, request).await?))
}

/// Build recommendation routes
pub fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/lastfm/recommendations/spice-up", post(spice_up))
        .route(
            "/api/lastfm/recommendations/spice-up-with-deezer",
            post(spice_up_with_conversion),
        )
}
