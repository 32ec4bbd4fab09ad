//! spice-rec library - multi-catalog recommendation service
//!
//! Aggregates similar tracks from Last.fm for a list of seed songs and
//! optionally resolves the results into an alternate catalog (Deezer or
//! Spotify). With Spotify configured, a second spice-up runs on Spotify's own
//! recommendation engine.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use config::{ResolutionCatalog, ServiceConfig};
use services::catalog::{build_http_client, CatalogAdapter};
use services::credentials::SPOTIFY_TOKEN_URL;
use services::{
    ClientCredentialsProvider, CrossCatalogResolver, DeezerClient, LastfmClient,
    RecommendationPipeline, SignedRequestBuilder, SpotifyClient, SpotifyRecommender,
};

/// Catalog clients shared by the pipeline and the pass-through endpoints
#[derive(Clone)]
pub struct Catalogs {
    pub lastfm: Arc<LastfmClient>,
    pub deezer: Arc<DeezerClient>,
    /// Present only when Spotify credentials are configured
    pub spotify: Option<Arc<SpotifyClient>>,
}

impl Catalogs {
    /// Production clients from resolved configuration
    pub fn from_config(config: &ServiceConfig) -> spice_common::Result<Self> {
        let http = build_http_client(config.pipeline.upstream_timeout)
            .map_err(|e| spice_common::Error::Internal(format!("HTTP client: {}", e)))?;

        let signer = SignedRequestBuilder::new(
            config.lastfm.api_key.clone(),
            Some(config.lastfm.shared_secret.clone()),
        );
        let lastfm = LastfmClient::new(http.clone(), signer)
            .with_application_name(config.lastfm.application_name.clone());

        let spotify = config.spotify.as_ref().map(|creds| {
            let tokens = ClientCredentialsProvider::new(
                http.clone(),
                SPOTIFY_TOKEN_URL,
                creds.client_id.clone(),
                creds.client_secret.clone(),
            );
            Arc::new(SpotifyClient::new(http.clone(), Arc::new(tokens)))
        });

        Ok(Self {
            lastfm: Arc::new(lastfm),
            deezer: Arc::new(DeezerClient::new(http)),
            spotify,
        })
    }

    /// Adapter backing cross-catalog resolution
    pub fn resolution_adapter(
        &self,
        catalog: ResolutionCatalog,
    ) -> spice_common::Result<Arc<dyn CatalogAdapter>> {
        match catalog {
            ResolutionCatalog::Deezer => Ok(self.deezer.clone() as Arc<dyn CatalogAdapter>),
            ResolutionCatalog::Spotify => self
                .spotify
                .clone()
                .map(|s| s as Arc<dyn CatalogAdapter>)
                .ok_or_else(|| {
                    spice_common::Error::Config(
                        "Spotify selected for resolution but not configured".to_string(),
                    )
                }),
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub catalogs: Catalogs,
    pub pipeline: RecommendationPipeline,
    /// Spotify-native spice-up; present when Spotify is configured
    pub spotify_recommender: Option<SpotifyRecommender>,
    /// Cancelled on shutdown; every request runs under a child token
    pub shutdown: CancellationToken,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(catalogs: Catalogs, pipeline: RecommendationPipeline) -> Self {
        let spotify_recommender = catalogs
            .spotify
            .clone()
            .map(|client| SpotifyRecommender::new(client, pipeline.settings()));
        Self {
            catalogs,
            pipeline,
            spotify_recommender,
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
        }
    }

    /// Wire catalogs, resolver and pipeline from resolved configuration
    pub fn from_config(config: &ServiceConfig) -> spice_common::Result<Self> {
        let catalogs = Catalogs::from_config(config)?;
        let resolver =
            CrossCatalogResolver::new(catalogs.resolution_adapter(config.resolution_catalog)?);
        let pipeline =
            RecommendationPipeline::new(catalogs.lastfm.clone(), resolver, config.pipeline);
        Ok(Self::new(catalogs, pipeline))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::recommendation_routes())
        .merge(api::lastfm_routes())
        .merge(api::deezer_routes())
        .merge(api::spotify_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
