//! Context-aware reranking for `contextual_search`.

use crate::search::types::MergedResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata keys read as optional ranking signals, each in [0, 1].
pub const META_RECENCY: &str = "recency";
pub const META_POPULARITY: &str = "popularity";

const NEUTRAL_SIGNAL: f32 = 0.5;
const LENGTH_NORMALIZER: f32 = 10_000.0;

/// Linear weights over the rerank features.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankWeights {
    pub combined: f32,
    pub exact_match: f32,
    pub context: f32,
    pub length: f32,
    pub recency: f32,
    pub popularity: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            combined: 0.6,
            exact_match: 0.15,
            context: 0.15,
            length: 0.05,
            recency: 0.025,
            popularity: 0.025,
        }
    }
}

/// Feature values for one result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankFeatures {
    pub combined: f32,
    pub exact_match: f32,
    pub context: f32,
    pub length: f32,
    pub recency: f32,
    pub popularity: f32,
}

impl RerankFeatures {
    #[must_use]
    pub fn extract(result: &MergedResult, query_lower: &str, file_context: &[String]) -> Self {
        let exact_match = if !query_lower.is_empty()
            && result.content.to_lowercase().contains(query_lower)
        {
            1.0
        } else {
            0.0
        };
        let length =
            (1.0 - result.content.chars().count() as f32 / LENGTH_NORMALIZER).clamp(0.0, 1.0);
        let signal = |key: &str| {
            result
                .metadata
                .get_f64(key)
                .map_or(NEUTRAL_SIGNAL, |v| (v as f32).clamp(0.0, 1.0))
        };

        Self {
            combined: result.combined_score(),
            exact_match,
            context: context_proximity(&result.file, file_context),
            length,
            recency: signal(META_RECENCY),
            popularity: signal(META_POPULARITY),
        }
    }

    #[must_use]
    pub fn score(&self, weights: &RerankWeights) -> f32 {
        weights.combined * self.combined
            + weights.exact_match * self.exact_match
            + weights.context * self.context
            + weights.length * self.length
            + weights.recency * self.recency
            + weights.popularity * self.popularity
    }
}

/// 1.0 when `file` is in the context, 0.5 when it shares a non-root parent
/// directory with a context file, 0.0 otherwise.
#[must_use]
pub fn context_proximity(file: &str, file_context: &[String]) -> f32 {
    if file_context.iter().any(|c| c == file) {
        return 1.0;
    }
    let parent = match Path::new(file).parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return 0.0,
    };
    if file_context
        .iter()
        .any(|c| Path::new(c).parent() == Some(parent))
    {
        0.5
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextualReranker {
    weights: RerankWeights,
}

impl ContextualReranker {
    #[must_use]
    pub fn new(weights: RerankWeights) -> Self {
        Self { weights }
    }

    /// Scores every result, records `rerank_score`, sorts descending (stable)
    /// and keeps the first `top_k`.
    #[must_use]
    pub fn rerank(
        &self,
        query: &str,
        mut results: Vec<MergedResult>,
        file_context: &[String],
        top_k: usize,
    ) -> Vec<MergedResult> {
        let query_lower = query.trim().to_lowercase();
        for result in &mut results {
            let score = RerankFeatures::extract(result, &query_lower, file_context)
                .score(&self.weights);
            result.hybrid_metadata.rerank_score = Some(score);
        }
        results.sort_by(|a, b| {
            let a = a.hybrid_metadata.rerank_score.unwrap_or_default();
            let b = b.hybrid_metadata.rerank_score.unwrap_or_default();
            b.total_cmp(&a)
        });
        results.truncate(top_k);
        results
    }
}
