//! Free-text song descriptors → canonical catalog seeds

use super::catalog::CatalogAdapter;
use super::worker_pool::WorkerPool;
use super::StageTally;
use crate::error::PipelineError;
use crate::models::{SeedMatch, SongDescriptor};

/// Hits requested per descriptor; only the first is used
pub const SEED_SEARCH_LIMIT: usize = 5;

/// Seeds in input order plus how many descriptors produced one
#[derive(Debug, Clone, Default)]
pub struct SeedResolution {
    pub seeds: Vec<SeedMatch>,
    pub matched_seed_count: usize,
}

/// Resolve every usable descriptor to its top search hit
///
/// Inert descriptors are skipped without an upstream call; lookups that find
/// nothing or fail are logged and skipped. Fails only on empty input or when
/// every completed lookup was refused for credential reasons.
pub async fn resolve_seeds(
    catalog: &dyn CatalogAdapter,
    songs: &[SongDescriptor],
    pool: &WorkerPool,
) -> Result<SeedResolution, PipelineError> {
    if songs.is_empty() {
        return Err(PipelineError::Validation("At least one song is required".to_string()));
    }

    let phrases: Vec<String> = songs
        .iter()
        .enumerate()
        .filter_map(|(index, song)| {
            let phrase = song.search_phrase();
            if phrase.is_none() {
                tracing::warn!(index, "Skipping song with no searchable fields");
            }
            phrase
        })
        .collect();

    let source = catalog.kind();
    let results = pool
        .run(phrases.iter().cloned(), |phrase| async move {
            catalog.search(&phrase, SEED_SEARCH_LIMIT).await
        })
        .await;

    let mut tally = StageTally::default();
    let mut resolution = SeedResolution::default();

    for (phrase, result) in phrases.iter().zip(results) {
        let Some(result) = result else {
            tracing::debug!(query = %phrase, "Seed lookup stopped before completion");
            continue;
        };
        tally.record(&result);

        match result {
            Ok(hits) => match hits.into_iter().next() {
                Some(hit) => {
                    tracing::debug!(query = %phrase, artist = %hit.artist, track = %hit.name, "Seed matched");
                    resolution.seeds.push(SeedMatch::from_hit(hit, source));
                    resolution.matched_seed_count += 1;
                }
                None => tracing::warn!(query = %phrase, "No results found"),
            },
            Err(e) => tracing::warn!(query = %phrase, error = %e, "Seed search failed"),
        }
    }

    if let Some(err) = tally.exhausted() {
        return Err(PipelineError::Credential(err));
    }

    tracing::info!(
        input_songs = songs.len(),
        matched = resolution.matched_seed_count,
        "Seed resolution complete"
    );

    Ok(resolution)
}
