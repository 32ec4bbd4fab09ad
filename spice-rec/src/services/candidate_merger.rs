//! Identity-keyed merge of per-seed candidate streams

use crate::error::PipelineError;
use crate::models::CandidateTrack;
use std::collections::HashSet;

/// Fold the candidate stream into one pool, best score first
///
/// The first occurrence of an identity key wins even when a later duplicate
/// scores higher. Equal scores keep stream order.
pub fn merge_candidates(stream: Vec<CandidateTrack>) -> Result<Vec<CandidateTrack>, PipelineError> {
    let mut seen = HashSet::with_capacity(stream.len());
    let mut pool: Vec<CandidateTrack> = stream
        .into_iter()
        .filter(|candidate| seen.insert(candidate.identity_key.clone()))
        .collect();

    if pool.is_empty() {
        return Err(PipelineError::NoCandidates);
    }

    pool.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::identity_key;

    fn candidate(artist: &str, name: &str, score: f64) -> CandidateTrack {
        CandidateTrack {
            identity_key: identity_key(artist, name),
            name: name.to_string(),
            artist: artist.to_string(),
            url: String::new(),
            match_score: score,
            mbid: None,
            external_id: None,
        }
    }

    #[test]
    fn test_first_seen_wins_over_higher_duplicate() {
        let merged = merge_candidates(vec![
            candidate("Radiohead", "Creep", 0.2),
            candidate("Muse", "Uprising", 0.5),
            candidate("RADIOHEAD", "creep", 0.9),
        ])
        .unwrap();

        assert_eq!(merged.len(), 2);
        let creep = merged.iter().find(|c| c.name == "Creep").unwrap();
        assert_eq!(creep.match_score, 0.2);
    }

    #[test]
    fn test_sorted_descending_and_stable() {
        let merged = merge_candidates(vec![
            candidate("a", "1", 0.3),
            candidate("b", "2", 0.9),
            candidate("c", "3", 0.3),
            candidate("d", "4", 0.6),
        ])
        .unwrap();

        let names: Vec<&str> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn test_empty_stream_is_no_candidates() {
        assert!(matches!(merge_candidates(vec![]), Err(PipelineError::NoCandidates)));
    }
}
