//! Score blending and ranking order.
//!
//! The final score of a candidate is a weighted blend:
//!
//! ```text
//! lexical = (ws * surface_matches + wl * lemma_matches) / (terms * (ws + wl))
//! score   = (1 - wsim) * lexical + wsim * similarity
//! ```
//!
//! Both parts are in `[0, 1]`, so the score is too. A missing similarity
//! contributes nothing. When no similarity provider is configured at all the
//! similarity weight is treated as zero, so lexical overlap alone spans the
//! full range.

use super::types::SearchHit;
use crate::config::FusionWeights;
use std::cmp::Ordering;

/// Weighted share of query terms matched, in `[0, 1]`.
pub fn lexical_score(
    surface_matches: usize,
    lemma_matches: usize,
    term_count: usize,
    weights: &FusionWeights,
) -> f32 {
    let denominator = term_count as f32 * (weights.surface_weight + weights.lemma_weight);
    if term_count == 0 || denominator <= 0.0 {
        return 0.0;
    }
    let numerator = weights.surface_weight * surface_matches as f32
        + weights.lemma_weight * lemma_matches as f32;
    (numerator / denominator).clamp(0.0, 1.0)
}

/// Blends lexical overlap with an optional similarity signal.
pub fn blend(lexical: f32, similarity: Option<f32>, similarity_weight: f32) -> f32 {
    let w = similarity_weight.clamp(0.0, 1.0);
    (1.0 - w) * lexical + w * similarity.unwrap_or(0.0)
}

/// Maps an arbitrary similarity value into `[0, 1]`; non-finite values are
/// dropped.
pub fn normalize_similarity(value: f32) -> Option<f32> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Ranking order: score descending, then work id and ordinal ascending.
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.segment.work_id.cmp(&b.segment.work_id))
        .then_with(|| a.segment.ordinal.cmp(&b.segment.ordinal))
}

/// Sorts hits into ranking order.
pub fn rank(hits: &mut [SearchHit]) {
    hits.sort_by(compare_hits);
}
