//! Request/result types for one recommendation run

use super::track::{CandidateTrack, SongDescriptor};
use serde::{Deserialize, Serialize};

/// Result count when the caller does not ask for one
pub const DEFAULT_LIMIT: usize = 20;

/// Hard cap on returned recommendations
pub const MAX_LIMIT: usize = 100;

/// Breadth/strictness policy for a recommendation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiversityMode {
    /// Few, close matches
    Strict,
    #[default]
    Normal,
    /// Wide net, no score filter
    Diverse,
}

impl DiversityMode {
    /// Similar tracks fetched per seed
    pub fn expansion_breadth(self) -> usize {
        match self {
            DiversityMode::Strict => 10,
            DiversityMode::Normal => 20,
            DiversityMode::Diverse => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiversityMode::Strict => "strict",
            DiversityMode::Normal => "normal",
            DiversityMode::Diverse => "diverse",
        }
    }
}

/// Validated input to the pipeline
#[derive(Debug, Clone)]
pub struct RecommendationRequest {
    pub songs: Vec<SongDescriptor>,
    pub limit: usize,
    pub mode: DiversityMode,
    /// Resolve results into the alternate catalog
    pub convert: bool,
}

impl RecommendationRequest {
    pub fn new(songs: Vec<SongDescriptor>) -> Self {
        Self {
            songs,
            limit: DEFAULT_LIMIT,
            mode: DiversityMode::default(),
            convert: false,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_mode(mut self, mode: DiversityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_conversion(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    /// Limit clamped to `1..=MAX_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }
}

/// Counts reported for cross-catalog conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSummary {
    pub converted: usize,
    pub total: usize,
}

/// A track to resolve in the alternate catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackToConvert {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

/// Output of one pipeline run
#[derive(Debug, Clone)]
pub struct RecommendationResult {
    pub mode: DiversityMode,
    pub input_song_count: usize,
    pub matched_seed_count: usize,
    pub recommendations: Vec<CandidateTrack>,
    /// Present only when conversion was requested and the alternate catalog answered
    pub conversion_summary: Option<ConversionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_breadth_per_mode() {
        assert_eq!(DiversityMode::Strict.expansion_breadth(), 10);
        assert_eq!(DiversityMode::Normal.expansion_breadth(), 20);
        assert_eq!(DiversityMode::Diverse.expansion_breadth(), 50);
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let mode: DiversityMode = serde_json::from_str("\"diverse\"").unwrap();
        assert_eq!(mode, DiversityMode::Diverse);
        assert_eq!(serde_json::to_string(&DiversityMode::Strict).unwrap(), "\"strict\"");
        assert!(serde_json::from_str::<DiversityMode>("\"wild\"").is_err());
    }

    #[test]
    fn test_effective_limit_clamped() {
        let request = RecommendationRequest::new(vec![]);
        assert_eq!(request.effective_limit(), DEFAULT_LIMIT);
        assert_eq!(request.clone().with_limit(500).effective_limit(), MAX_LIMIT);
        assert_eq!(request.with_limit(0).effective_limit(), 1);
    }
}
