//! Result shapes produced by the orchestrator.

use crate::text::LexicalHit;
use crate::vector::{Metadata, SemanticHit};
use serde::{Deserialize, Serialize};

/// Metadata key holding the 1-based line of a lexical match.
pub const META_LINE_NUMBER: &str = "line_number";

/// Which retrieval leg produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Semantic,
    Lexical,
    Both,
}

impl ResultSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Both => "both",
        }
    }
}

/// Score breakdown attached to every merged result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridMetadata {
    /// Ranking key for `combined` and `parallel`.
    pub combined_score: f32,
    /// Raw cosine similarity, when a semantic hit contributed.
    pub semantic_score: Option<f32>,
    /// Normalized match quality, when a lexical hit contributed.
    pub text_score: Option<f32>,
    pub semantic_contribution: f32,
    pub text_contribution: f32,
    pub semantic_ratio: f32,
    /// Set by contextual reranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

/// One file in a hybrid result list. A file appears at most once per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResult {
    pub file: String,
    /// Vector id, when a semantic hit contributed.
    pub id: Option<String>,
    /// Content preview or the matching line.
    pub content: String,
    pub file_type: Option<String>,
    pub line_number: Option<usize>,
    pub source: ResultSource,
    pub metadata: Metadata,
    pub hybrid_metadata: HybridMetadata,
}

impl MergedResult {
    /// Builds a semantic-only result; the contribution is `max(score, 0) * ratio`.
    #[must_use]
    pub fn from_semantic(hit: SemanticHit, ratio: f32) -> Self {
        let contribution = hit.score.max(0.0) * ratio;
        Self {
            file: hit.file_key().to_string(),
            content: hit
                .metadata
                .content_preview()
                .unwrap_or_default()
                .to_string(),
            file_type: hit.metadata.file_type().map(str::to_string),
            line_number: None,
            source: ResultSource::Semantic,
            hybrid_metadata: HybridMetadata {
                combined_score: contribution,
                semantic_score: Some(hit.score),
                text_score: None,
                semantic_contribution: contribution,
                text_contribution: 0.0,
                semantic_ratio: ratio,
                rerank_score: None,
            },
            id: Some(hit.id),
            metadata: hit.metadata,
        }
    }

    /// Builds a lexical-only result; the contribution is `match_score * (1 - ratio)`.
    #[must_use]
    pub fn from_lexical(hit: LexicalHit, ratio: f32) -> Self {
        let text_score = hit.match_score();
        let contribution = text_score * (1.0 - ratio);
        let metadata = Metadata::for_file(&hit.file, &hit.line, &hit.file_type)
            .with(META_LINE_NUMBER, hit.line_number as i64);
        Self {
            file: hit.file,
            id: None,
            content: hit.line,
            file_type: Some(hit.file_type),
            line_number: Some(hit.line_number),
            source: ResultSource::Lexical,
            metadata,
            hybrid_metadata: HybridMetadata {
                combined_score: contribution,
                semantic_score: None,
                text_score: Some(text_score),
                semantic_contribution: 0.0,
                text_contribution: contribution,
                semantic_ratio: ratio,
                rerank_score: None,
            },
        }
    }

    #[must_use]
    pub fn combined_score(&self) -> f32 {
        self.hybrid_metadata.combined_score
    }

    /// Folds a lexical result for the same file into this one.
    ///
    /// The stronger lexical contribution wins, and the combined score is
    /// recomputed as the sum of both legs.
    pub(crate) fn absorb_lexical(&mut self, other: &MergedResult) {
        let hm = &mut self.hybrid_metadata;
        if other.hybrid_metadata.text_contribution > hm.text_contribution || hm.text_score.is_none()
        {
            hm.text_contribution = other.hybrid_metadata.text_contribution;
            hm.text_score = other.hybrid_metadata.text_score;
            if self.line_number.is_none() || self.source == ResultSource::Lexical {
                self.line_number = other.line_number;
            }
            if self.content.is_empty() || self.source == ResultSource::Lexical {
                self.content = other.content.clone();
            }
        }
        hm.combined_score = hm.semantic_contribution + hm.text_contribution;
        if self.source == ResultSource::Semantic {
            self.source = ResultSource::Both;
        }
        if self.file_type.is_none() {
            self.file_type = other.file_type.clone();
        }
    }

    /// Folds a semantic result for the same file into this one.
    pub(crate) fn absorb_semantic(&mut self, other: &MergedResult) {
        let hm = &mut self.hybrid_metadata;
        if other.hybrid_metadata.semantic_contribution > hm.semantic_contribution
            || hm.semantic_score.is_none()
        {
            hm.semantic_contribution = other.hybrid_metadata.semantic_contribution;
            hm.semantic_score = other.hybrid_metadata.semantic_score;
            if self.id.is_none() {
                self.id = other.id.clone();
            }
        }
        hm.combined_score = hm.semantic_contribution + hm.text_contribution;
        if self.source == ResultSource::Lexical {
            self.source = ResultSource::Both;
        }
    }
}
