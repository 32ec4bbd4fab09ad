//! Best-effort per-track id resolution into an alternate catalog

use super::catalog::{CatalogAdapter, UpstreamError};
use super::worker_pool::WorkerPool;
use crate::models::{CatalogKind, ConversionSummary, TrackToConvert};
use std::sync::Arc;

/// Per-track ids (input order) and the counts over them
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub external_ids: Vec<Option<String>>,
    pub summary: ConversionSummary,
}

/// Converts tracks into the ids of one alternate catalog
#[derive(Clone)]
pub struct CrossCatalogResolver {
    catalog: Arc<dyn CatalogAdapter>,
}

impl CrossCatalogResolver {
    pub fn new(catalog: Arc<dyn CatalogAdapter>) -> Self {
        Self { catalog }
    }

    pub fn catalog_kind(&self) -> CatalogKind {
        self.catalog.kind()
    }

    /// Resolve every track independently
    ///
    /// A failed or unmatched track gets `None`. The whole call fails only when
    /// no track got an answer and every track either hit a path-level failure
    /// (transport, credential, rate limit) or was stopped; the alternate
    /// catalog is then considered unavailable.
    pub async fn resolve(
        &self,
        tracks: &[TrackToConvert],
        pool: &WorkerPool,
    ) -> Result<ConversionOutcome, UpstreamError> {
        let catalog = self.catalog.as_ref();

        let results = pool
            .run(tracks.iter().cloned(), |track| async move {
                catalog.convert_id(&track.name, track.artist.as_deref()).await
            })
            .await;

        let mut answered = 0usize;
        let mut path_failure: Option<UpstreamError> = None;
        let mut item_failures = 0usize;
        let mut external_ids = Vec::with_capacity(tracks.len());

        for (track, result) in tracks.iter().zip(results) {
            match result {
                Some(Ok(id)) => {
                    answered += 1;
                    external_ids.push(id);
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        catalog = %catalog.kind(),
                        name = %track.name,
                        error = %e,
                        "Track conversion failed"
                    );
                    if e.is_path_failure() {
                        path_failure.get_or_insert(e);
                    } else {
                        item_failures += 1;
                    }
                    external_ids.push(None);
                }
                None => external_ids.push(None),
            }
        }

        if !tracks.is_empty() && answered == 0 && item_failures == 0 {
            let error = path_failure.unwrap_or_else(|| UpstreamError::Unavailable {
                catalog: catalog.kind(),
                message: "conversion stopped before any track completed".to_string(),
            });
            tracing::warn!(catalog = %catalog.kind(), error = %error, "Alternate catalog unavailable");
            return Err(error);
        }

        let converted = external_ids.iter().filter(|id| id.is_some()).count();
        tracing::info!(
            catalog = %catalog.kind(),
            converted,
            total = tracks.len(),
            "Cross-catalog conversion complete"
        );

        Ok(ConversionOutcome {
            summary: ConversionSummary {
                converted,
                total: tracks.len(),
            },
            external_ids,
        })
    }
}
