//! Spice-up served from Spotify's own recommendation engine
//!
//! Each song is resolved to its top Spotify hit; the collected track and
//! artist ids then seed a single `/recommendations` call whose audio-feature
//! ranges follow the diversity mode.

use super::catalog::spotify_client::{
    RecommendationQuery, RecommendationSeed, SpotifyClient, SpotifyTrack,
};
use super::recommendation_pipeline::PipelineSettings;
use super::worker_pool::{PipelineBudget, WorkerPool};
use super::StageTally;
use crate::error::PipelineError;
use crate::models::{DiversityMode, RecommendationRequest};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Output of one Spotify spice-up run
#[derive(Debug, Clone)]
pub struct SpotifySpiceUp {
    pub mode: DiversityMode,
    pub input_song_count: usize,
    pub matched_seed_count: usize,
    pub seeds: Vec<RecommendationSeed>,
    pub recommendations: Vec<SpotifyTrack>,
}

/// Upstream limit on seeds of all kinds combined
const MAX_TOTAL_SEEDS: usize = 5;

/// Seed caps and feature ranges for one mode
struct ModeShape {
    max_track_seeds: usize,
    max_artist_seeds: usize,
    /// (feature, min, max)
    ranges: &'static [(&'static str, f64, f64)],
}

fn mode_shape(mode: DiversityMode) -> ModeShape {
    match mode {
        DiversityMode::Strict => ModeShape {
            max_track_seeds: 2,
            max_artist_seeds: 1,
            ranges: &[("danceability", 0.4, 0.6), ("popularity", 40.0, 60.0), ("energy", 0.4, 0.6)],
        },
        DiversityMode::Normal => ModeShape {
            max_track_seeds: 3,
            max_artist_seeds: 2,
            ranges: &[("danceability", 0.3, 0.7), ("popularity", 30.0, 70.0), ("energy", 0.3, 0.7)],
        },
        DiversityMode::Diverse => ModeShape {
            max_track_seeds: 5,
            max_artist_seeds: 3,
            ranges: &[
                ("danceability", 0.2, 0.8),
                ("popularity", 20.0, 80.0),
                ("energy", 0.2, 0.8),
                ("valence", 0.2, 0.8),
            ],
        },
    }
}

/// Recommendation query for resolved seed ids under `mode`
///
/// Track seeds take precedence; artist seeds fill what remains of the
/// five-seed allowance.
pub fn mode_query(
    mode: DiversityMode,
    track_ids: &[String],
    artist_ids: &[String],
    limit: usize,
) -> RecommendationQuery {
    let shape = mode_shape(mode);

    let seed_tracks: Vec<String> = track_ids.iter().take(shape.max_track_seeds).cloned().collect();
    let artist_room = shape
        .max_artist_seeds
        .min(MAX_TOTAL_SEEDS.saturating_sub(seed_tracks.len()));

    let mut query = RecommendationQuery {
        seed_artists: artist_ids.iter().take(artist_room).cloned().collect(),
        seed_tracks,
        limit: Some(limit),
        ..RecommendationQuery::default()
    }
    .with_tunable("target_danceability", 0.5)
    .with_tunable("target_popularity", 50.0);

    for (feature, min, max) in shape.ranges {
        query = query
            .with_tunable(&format!("min_{}", feature), *min)
            .with_tunable(&format!("max_{}", feature), *max);
    }
    query
}

/// Spotify-backed spice-up runner
#[derive(Clone)]
pub struct SpotifyRecommender {
    client: Arc<SpotifyClient>,
    settings: PipelineSettings,
}

impl SpotifyRecommender {
    pub fn new(client: Arc<SpotifyClient>, settings: PipelineSettings) -> Self {
        Self { client, settings }
    }

    fn pool(&self, cancel: &CancellationToken, songs: usize) -> WorkerPool {
        let budget = PipelineBudget {
            workers: self.settings.worker_count,
            per_call: self.settings.upstream_timeout,
            ceiling: self.settings.deadline_ceiling,
        };
        // One lookup per song plus the recommendations call
        let allowed = budget.deadline_for(0, songs + 1);
        WorkerPool::new(
            self.settings.worker_count,
            cancel.clone(),
            Instant::now() + allowed,
        )
    }

    pub async fn spice_up(
        &self,
        request: RecommendationRequest,
        cancel: CancellationToken,
    ) -> Result<SpotifySpiceUp, PipelineError> {
        let span = tracing::info_span!(
            "spotify_spice_up",
            request_id = %Uuid::new_v4(),
            mode = request.mode.as_str(),
            songs = request.songs.len(),
        );
        self.spice_up_inner(request, cancel).instrument(span).await
    }

    async fn spice_up_inner(
        &self,
        request: RecommendationRequest,
        cancel: CancellationToken,
    ) -> Result<SpotifySpiceUp, PipelineError> {
        if request.songs.is_empty() {
            return Err(PipelineError::Validation("At least one song is required".to_string()));
        }

        let pool = self.pool(&cancel, request.songs.len());
        let phrases: Vec<String> = request
            .songs
            .iter()
            .filter_map(|song| song.search_phrase())
            .collect();

        let client = self.client.as_ref();
        let lookups = pool
            .run(phrases.iter().cloned(), |phrase| async move {
                client.find_seed(&phrase).await
            })
            .await;

        let mut tally = StageTally::default();
        let mut track_ids: Vec<String> = Vec::new();
        let mut artist_ids: Vec<String> = Vec::new();

        for (phrase, lookup) in phrases.iter().zip(lookups) {
            let Some(lookup) = lookup else {
                continue;
            };
            tally.record(&lookup);

            match lookup {
                Ok(Some(seed)) => {
                    track_ids.push(seed.track_id);
                    for id in seed.artist_ids {
                        if !artist_ids.contains(&id) {
                            artist_ids.push(id);
                        }
                    }
                }
                Ok(None) => tracing::warn!(query = %phrase, "No results found"),
                Err(e) => tracing::warn!(query = %phrase, error = %e, "Seed lookup failed"),
            }
        }

        if let Some(err) = tally.exhausted() {
            return Err(PipelineError::Credential(err));
        }
        if track_ids.is_empty() && artist_ids.is_empty() {
            return Err(PipelineError::Validation(
                "Could not find any matching tracks or artists. Please check your song information."
                    .to_string(),
            ));
        }

        let matched_seed_count = track_ids.len();
        let query = mode_query(request.mode, &track_ids, &artist_ids, request.effective_limit());

        let reply = pool
            .run([query], |query| async move { client.recommendations(&query).await })
            .await
            .into_iter()
            .next()
            .flatten();
        let Some(reply) = reply else {
            tracing::warn!("Recommendation call stopped before completion");
            return Err(PipelineError::NoCandidates);
        };
        let recommendations = reply?;

        tracing::info!(
            matched_seeds = matched_seed_count,
            recommendations = recommendations.tracks.len(),
            "Spotify spice-up complete"
        );

        Ok(SpotifySpiceUp {
            mode: request.mode,
            input_song_count: request.songs.len(),
            matched_seed_count,
            seeds: recommendations.seeds,
            recommendations: recommendations.tracks,
        })
    }
}
