//! Recommendation pipeline orchestration
//!
//! SeedResolver → SimilarityExpander → merge → DiversityPolicy →
//! (optional) CrossCatalogResolver. Each run owns a [`WorkerPool`] bounded by
//! the configured worker count and a deadline sized from the request.

use super::catalog::CatalogAdapter;
use super::candidate_merger::merge_candidates;
use super::cross_catalog_resolver::{ConversionOutcome, CrossCatalogResolver};
use super::diversity_policy::select;
use super::seed_resolver::resolve_seeds;
use super::similarity_expander::expand_seeds;
use super::worker_pool::{PipelineBudget, WorkerPool};
use crate::error::PipelineError;
use crate::models::{CatalogKind, RecommendationRequest, RecommendationResult, TrackToConvert};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Concurrency and time limits for pipeline runs
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub upstream_timeout: Duration,
    pub deadline_ceiling: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            upstream_timeout: Duration::from_secs(10),
            deadline_ceiling: Duration::from_secs(60),
        }
    }
}

/// Aggregates similar tracks from the primary catalog
#[derive(Clone)]
pub struct RecommendationPipeline {
    primary: Arc<dyn CatalogAdapter>,
    resolver: CrossCatalogResolver,
    settings: PipelineSettings,
}

impl RecommendationPipeline {
    pub fn new(
        primary: Arc<dyn CatalogAdapter>,
        resolver: CrossCatalogResolver,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            primary,
            resolver,
            settings,
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub fn primary_catalog(&self) -> CatalogKind {
        self.primary.kind()
    }

    pub fn resolution_catalog(&self) -> CatalogKind {
        self.resolver.catalog_kind()
    }

    fn budget(&self) -> PipelineBudget {
        PipelineBudget {
            workers: self.settings.worker_count,
            per_call: self.settings.upstream_timeout,
            ceiling: self.settings.deadline_ceiling,
        }
    }

    fn pool(&self, cancel: &CancellationToken, songs: usize, conversions: usize) -> WorkerPool {
        let allowed = self.budget().deadline_for(songs, conversions);
        WorkerPool::new(
            self.settings.worker_count,
            cancel.clone(),
            Instant::now() + allowed,
        )
    }

    /// Run one recommendation request end to end
    pub async fn run(
        &self,
        request: RecommendationRequest,
        cancel: CancellationToken,
    ) -> Result<RecommendationResult, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "spice_up",
            request_id = %request_id,
            catalog = %self.primary_catalog(),
            mode = request.mode.as_str(),
            songs = request.songs.len(),
        );

        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        request: RecommendationRequest,
        cancel: CancellationToken,
    ) -> Result<RecommendationResult, PipelineError> {
        let started = std::time::Instant::now();
        let limit = request.effective_limit();
        let conversions = if request.convert { limit } else { 0 };
        let pool = self.pool(&cancel, request.songs.len(), conversions);

        tracing::info!(limit, convert = request.convert, "Starting recommendation pipeline");

        let resolution = resolve_seeds(self.primary.as_ref(), &request.songs, &pool).await?;
        let stream =
            expand_seeds(self.primary.as_ref(), &resolution.seeds, request.mode, &pool).await?;
        let merged = merge_candidates(stream)?;
        let pool_size = merged.len();
        let mut recommendations = select(merged, request.mode, limit);

        tracing::debug!(pool_size, selected = recommendations.len(), "Diversity policy applied");

        let conversion_summary = if request.convert {
            let tracks: Vec<TrackToConvert> = recommendations
                .iter()
                .map(|c| TrackToConvert {
                    name: c.name.clone(),
                    artist: Some(c.artist.clone()),
                })
                .collect();

            match self.resolver.resolve(&tracks, &pool).await {
                Ok(outcome) => {
                    for (candidate, id) in recommendations.iter_mut().zip(outcome.external_ids) {
                        candidate.external_id = id;
                    }
                    Some(outcome.summary)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cross-catalog conversion failed, returning base list");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            matched_seeds = resolution.matched_seed_count,
            recommendations = recommendations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recommendation pipeline complete"
        );

        Ok(RecommendationResult {
            mode: request.mode,
            input_song_count: request.songs.len(),
            matched_seed_count: resolution.matched_seed_count,
            recommendations,
            conversion_summary,
        })
    }

    /// Resolve a caller-supplied batch into the alternate catalog
    pub async fn convert_batch(
        &self,
        tracks: &[TrackToConvert],
        cancel: CancellationToken,
    ) -> Result<ConversionOutcome, PipelineError> {
        if tracks.is_empty() {
            return Err(PipelineError::Validation("At least one track is required".to_string()));
        }

        let span = tracing::info_span!(
            "convert",
            request_id = %Uuid::new_v4(),
            catalog = %self.resolution_catalog(),
            tracks = tracks.len(),
        );

        async {
            let pool = self.pool(&cancel, 0, tracks.len());
            self.resolver
                .resolve(tracks, &pool)
                .await
                .map_err(PipelineError::from)
        }
        .instrument(span)
        .await
    }
}
