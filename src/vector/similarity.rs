//! Similarity primitives shared by the exact and approximate indexes.

use std::cmp::Ordering;

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot_product = dot(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Returns a unit-length copy of `vector`.
///
/// Zero vectors stay zero, so they score 0.0 against everything.
#[must_use]
pub fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|x| x / norm).collect()
}

/// A scored index hit before metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub key: String,
    pub score: f32,
    pub seq: u64,
}

/// Orders hits by score descending, most recent insertion first on ties.
pub fn rank_hits(hits: &mut [IndexHit]) {
    hits.sort_by(compare_hits);
}

fn compare_hits(a: &IndexHit, b: &IndexHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.seq.cmp(&a.seq))
}
