//! Merge and rank for the four strategies.
//!
//! File identity is the exact path string; no normalization is applied.

use crate::search::types::MergedResult;
use crate::text::LexicalHit;
use crate::vector::SemanticHit;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Ratio used when neither a per-call ratio nor usable weights are given.
pub const DEFAULT_SEMANTIC_RATIO: f32 = 0.6;

/// Resolves the semantic ratio for a call.
///
/// An explicit ratio wins; otherwise `semantic_weight / (semantic_weight +
/// text_weight)`. The result is clamped to [0, 1]; NaN falls back to the
/// default. Out-of-range input is tolerated, never rejected.
#[must_use]
pub fn resolve_ratio(explicit: Option<f32>, semantic_weight: f32, text_weight: f32) -> f32 {
    let raw = explicit.unwrap_or_else(|| {
        let total = semantic_weight + text_weight;
        if total > 0.0 && total.is_finite() {
            semantic_weight / total
        } else {
            DEFAULT_SEMANTIC_RATIO
        }
    });
    if raw.is_nan() {
        DEFAULT_SEMANTIC_RATIO
    } else {
        raw.clamp(0.0, 1.0)
    }
}

/// Weighted rank fusion used by `combined` and `parallel`.
///
/// Each file appears once. A file found by both legs gets the sum of its
/// contributions; within one leg the stronger hit for a file wins. Output is
/// sorted by combined score descending, ties keeping first-seen order
/// (semantic hits before lexical ones). Not truncated.
#[must_use]
pub fn merge_and_rank(
    semantic: Vec<SemanticHit>,
    lexical: Vec<LexicalHit>,
    ratio: f32,
) -> Vec<MergedResult> {
    let mut merged: Vec<MergedResult> = Vec::with_capacity(semantic.len() + lexical.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in semantic {
        let result = MergedResult::from_semantic(hit, ratio);
        match positions.get(&result.file) {
            Some(&pos) => merged[pos].absorb_semantic(&result),
            None => {
                positions.insert(result.file.clone(), merged.len());
                merged.push(result);
            }
        }
    }

    for hit in lexical {
        let result = MergedResult::from_lexical(hit, ratio);
        match positions.get(&result.file) {
            Some(&pos) => merged[pos].absorb_lexical(&result),
            None => {
                positions.insert(result.file.clone(), merged.len());
                merged.push(result);
            }
        }
    }

    sort_by_combined_score(&mut merged);
    merged
}

/// Stable sort, highest combined score first.
pub fn sort_by_combined_score(results: &mut [MergedResult]) {
    results.sort_by(|a, b| descending(a.combined_score(), b.combined_score()));
}

fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

/// `semantic_first`: semantic hits in store order, then lexical backfill.
///
/// Backfilled hits are appended, not fused, and only for files not already
/// present. Output is capped at `top_k`.
#[must_use]
pub fn semantic_first(
    semantic: Vec<SemanticHit>,
    lexical: Vec<LexicalHit>,
    ratio: f32,
    top_k: usize,
) -> Vec<MergedResult> {
    let mut results = Vec::with_capacity(top_k);
    let mut seen: HashSet<String> = HashSet::new();

    for hit in semantic {
        if results.len() >= top_k {
            return results;
        }
        let result = MergedResult::from_semantic(hit, ratio);
        if seen.insert(result.file.clone()) {
            results.push(result);
        }
    }
    append_lexical(&mut results, &mut seen, lexical, ratio, top_k);
    results
}

/// `text_first`: lexical hits first, then semantic hits for new files whose
/// similarity reaches `relevance_threshold`. Output is capped at `top_k`.
#[must_use]
pub fn text_first(
    lexical: Vec<LexicalHit>,
    semantic: Vec<SemanticHit>,
    ratio: f32,
    top_k: usize,
    relevance_threshold: f32,
) -> Vec<MergedResult> {
    let mut results = Vec::with_capacity(top_k);
    let mut seen: HashSet<String> = HashSet::new();

    append_lexical(&mut results, &mut seen, lexical, ratio, top_k);
    for hit in semantic {
        if results.len() >= top_k {
            break;
        }
        if hit.score < relevance_threshold {
            continue;
        }
        let result = MergedResult::from_semantic(hit, ratio);
        if seen.insert(result.file.clone()) {
            results.push(result);
        }
    }
    results
}

fn append_lexical(
    results: &mut Vec<MergedResult>,
    seen: &mut HashSet<String>,
    lexical: Vec<LexicalHit>,
    ratio: f32,
    top_k: usize,
) {
    for hit in lexical {
        if results.len() >= top_k {
            return;
        }
        if !seen.insert(hit.file.clone()) {
            continue;
        }
        results.push(MergedResult::from_lexical(hit, ratio));
    }
}
