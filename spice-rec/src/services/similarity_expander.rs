//! Seeds → weighted candidate stream

use super::catalog::CatalogAdapter;
use super::worker_pool::WorkerPool;
use super::StageTally;
use crate::error::PipelineError;
use crate::models::{CandidateTrack, DiversityMode, SeedMatch};

/// Fetch similar tracks for every seed
///
/// Output is seed order, then each seed's own rank order. Failed seeds are
/// logged and contribute nothing.
pub async fn expand_seeds(
    catalog: &dyn CatalogAdapter,
    seeds: &[SeedMatch],
    mode: DiversityMode,
    pool: &WorkerPool,
) -> Result<Vec<CandidateTrack>, PipelineError> {
    let breadth = mode.expansion_breadth();

    let results = pool
        .run(seeds.iter().cloned(), |seed| async move {
            catalog
                .get_similar(&seed.canonical_artist, &seed.canonical_name, breadth)
                .await
        })
        .await;

    let mut tally = StageTally::default();
    let mut candidates = Vec::new();

    for (seed, result) in seeds.iter().zip(results) {
        let Some(result) = result else {
            tracing::debug!(artist = %seed.canonical_artist, track = %seed.canonical_name, "Expansion stopped before completion");
            continue;
        };
        tally.record(&result);

        match result {
            Ok(similar) => {
                tracing::debug!(
                    artist = %seed.canonical_artist,
                    track = %seed.canonical_name,
                    count = similar.len(),
                    "Similar tracks fetched"
                );
                candidates.extend(
                    similar
                        .into_iter()
                        .enumerate()
                        .map(|(rank, track)| CandidateTrack::from_catalog(track, rank)),
                );
            }
            Err(e) => tracing::warn!(
                artist = %seed.canonical_artist,
                track = %seed.canonical_name,
                error = %e,
                "Failed to get similar tracks"
            ),
        }
    }

    if let Some(err) = tally.exhausted() {
        return Err(PipelineError::Credential(err));
    }

    Ok(candidates)
}
