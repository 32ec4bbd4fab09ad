//! Services for the recommendation pipeline
//!
//! Leaves first: credentials, catalog adapters, the worker pool, then the
//! pipeline stages in execution order.

pub mod candidate_merger;
pub mod catalog;
pub mod credentials;
pub mod cross_catalog_resolver;
pub mod diversity_policy;
pub mod recommendation_pipeline;
pub mod seed_resolver;
pub mod similarity_expander;
pub mod spotify_recommender;
pub mod worker_pool;

pub use candidate_merger::merge_candidates;
pub use catalog::{CatalogAdapter, DeezerClient, LastfmClient, SpotifyClient, UpstreamError};
pub use credentials::{ClientCredentialsProvider, CredentialError, SignedRequestBuilder, TokenProvider};
pub use cross_catalog_resolver::{ConversionOutcome, CrossCatalogResolver};
pub use diversity_policy::select;
pub use recommendation_pipeline::{PipelineSettings, RecommendationPipeline};
pub use seed_resolver::{resolve_seeds, SeedResolution};
pub use similarity_expander::expand_seeds;
pub use spotify_recommender::{SpotifyRecommender, SpotifySpiceUp};
pub use worker_pool::{PipelineBudget, WorkerPool};

/// Per-stage accounting of completed upstream calls
///
/// A stage whose every completed call failed for credential reasons cannot
/// produce anything on retry either, so it fails the request instead of
/// degrading to an empty result.
#[derive(Debug, Default)]
pub(crate) struct StageTally {
    completed: usize,
    credential_failures: usize,
    first_credential_error: Option<CredentialError>,
}

impl StageTally {
    pub(crate) fn record<T>(&mut self, outcome: &Result<T, UpstreamError>) {
        self.completed += 1;
        if let Err(UpstreamError::Credential(err)) = outcome {
            self.credential_failures += 1;
            self.first_credential_error.get_or_insert_with(|| err.clone());
        }
    }

    /// Credential error to propagate when every completed call hit one
    pub(crate) fn exhausted(self) -> Option<CredentialError> {
        if self.completed > 0 && self.credential_failures == self.completed {
            self.first_credential_error
        } else {
            None
        }
    }
}
