//! Mode-dependent selection over the merged, sorted pool
//!
//! | mode    | selection                                                    |
//! |---------|--------------------------------------------------------------|
//! | strict  | score ≥ 0.5                                                  |
//! | normal  | ⌈0.7·limit⌉ with score ≥ 0.3, then ⌈0.3·limit⌉ in [0.1, 0.3) |
//! | diverse | pool as-is                                                   |
//!
//! Every mode is truncated to `limit`. Synthetic scores (`100 - rank`) clear
//! every threshold.

use crate::models::{CandidateTrack, DiversityMode};

const STRICT_MIN_SCORE: f64 = 0.5;
const NORMAL_HIGH_MIN_SCORE: f64 = 0.3;
const NORMAL_MEDIUM_MIN_SCORE: f64 = 0.1;

/// `ceil(limit * tenths / 10)` without float rounding
fn ceil_fraction(limit: usize, tenths: usize) -> usize {
    (limit * tenths).div_ceil(10)
}

/// Apply the mode's selection policy, then truncate to `limit`
pub fn select(pool: Vec<CandidateTrack>, mode: DiversityMode, limit: usize) -> Vec<CandidateTrack> {
    match mode {
        DiversityMode::Strict => pool
            .into_iter()
            .filter(|c| c.match_score >= STRICT_MIN_SCORE)
            .take(limit)
            .collect(),
        DiversityMode::Normal => {
            let (high, rest): (Vec<_>, Vec<_>) = pool
                .into_iter()
                .partition(|c| c.match_score >= NORMAL_HIGH_MIN_SCORE);

            high.into_iter()
                .take(ceil_fraction(limit, 7))
                .chain(
                    rest.into_iter()
                        .filter(|c| c.match_score >= NORMAL_MEDIUM_MIN_SCORE)
                        .take(ceil_fraction(limit, 3)),
                )
                .take(limit)
                .collect()
        }
        DiversityMode::Diverse => pool.into_iter().take(limit).collect(),
    }
}
