//! Scripted in-process catalog adapter

use async_trait::async_trait;
use spice_rec::models::{CatalogKind, CatalogTrack};
use spice_rec::services::catalog::{CatalogAdapter, UpstreamError};
use spice_rec::services::credentials::CredentialError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn track(name: &str, artist: &str, score: Option<f64>) -> CatalogTrack {
    CatalogTrack {
        id: Some(format!("{}-{}", artist, name).to_lowercase().replace(' ', "-")),
        name: name.to_string(),
        artist: artist.to_string(),
        url: format!("https://catalog.test/{}/{}", artist, name).replace(' ', "+"),
        match_score: score,
        mbid: None,
    }
}

pub fn unavailable(kind: CatalogKind) -> UpstreamError {
    UpstreamError::Unavailable {
        catalog: kind,
        message: "connection refused".to_string(),
    }
}

pub fn rejected() -> UpstreamError {
    UpstreamError::Credential(CredentialError::Rejected {
        status: 403,
        message: "Invalid API key".to_string(),
    })
}

/// Catalog answering from fixed tables; unknown keys answer empty
pub struct FakeCatalog {
    kind: CatalogKind,
    search: HashMap<String, Result<Vec<CatalogTrack>, UpstreamError>>,
    similar: HashMap<(String, String), Result<Vec<CatalogTrack>, UpstreamError>>,
    convert: HashMap<String, Result<Option<String>, UpstreamError>>,
    convert_default: Option<Result<Option<String>, UpstreamError>>,
    delay: Option<Duration>,
    convert_delay: HashMap<String, Duration>,
    pub search_calls: AtomicUsize,
    pub similar_calls: AtomicUsize,
    pub convert_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(kind: CatalogKind) -> Self {
        Self {
            kind,
            search: HashMap::new(),
            similar: HashMap::new(),
            convert: HashMap::new(),
            convert_default: None,
            delay: None,
            convert_delay: HashMap::new(),
            search_calls: AtomicUsize::new(0),
            similar_calls: AtomicUsize::new(0),
            convert_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_search(
        mut self,
        query: &str,
        result: Result<Vec<CatalogTrack>, UpstreamError>,
    ) -> Self {
        self.search.insert(query.to_string(), result);
        self
    }

    pub fn with_similar(
        mut self,
        artist: &str,
        track: &str,
        result: Result<Vec<CatalogTrack>, UpstreamError>,
    ) -> Self {
        self.similar
            .insert((artist.to_string(), track.to_string()), result);
        self
    }

    pub fn with_convert(mut self, name: &str, result: Result<Option<String>, UpstreamError>) -> Self {
        self.convert.insert(name.to_string(), result);
        self
    }

    /// Answer for names without a scripted conversion
    pub fn with_convert_default(mut self, result: Result<Option<String>, UpstreamError>) -> Self {
        self.convert_default = Some(result);
        self
    }

    /// Delay every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay conversions of one name only
    pub fn with_convert_delay(mut self, name: &str, delay: Duration) -> Self {
        self.convert_delay.insert(name.to_string(), delay);
        self
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn total_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
            + self.similar_calls.load(Ordering::SeqCst)
            + self.convert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogAdapter for FakeCatalog {
    fn kind(&self) -> CatalogKind {
        self.kind
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, UpstreamError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.search
            .get(query)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(|hits| hits.into_iter().take(limit).collect())
    }

    async fn get_similar(
        &self,
        artist: &str,
        track: &str,
        limit: usize,
    ) -> Result<Vec<CatalogTrack>, UpstreamError> {
        self.similar_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.similar
            .get(&(artist.to_string(), track.to_string()))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(|hits| hits.into_iter().take(limit).collect())
    }

    async fn convert_id(
        &self,
        name: &str,
        _artist: Option<&str>,
    ) -> Result<Option<String>, UpstreamError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(delay) = self.convert_delay.get(name) {
            tokio::time::sleep(*delay).await;
        }
        self.convert
            .get(name)
            .cloned()
            .or_else(|| self.convert_default.clone())
            .unwrap_or(Ok(None))
    }
}
