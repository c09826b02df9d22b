//! Lexical search collaborator.
//!
//! The orchestrator only needs ranked line matches; how they are found is
//! up to the backend. [`WorkspaceGrep`] is the bundled implementation.

mod grep;

pub use grep::WorkspaceGrep;

use crate::error::{TextSearchError, TextSearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single matching line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub file: String,
    /// 1-based line number.
    pub line_number: usize,
    pub line: String,
    pub matched_text: String,
    /// Byte offset of the match within `line`.
    pub match_start: usize,
    /// Exclusive byte offset of the match end within `line`.
    pub match_end: usize,
    pub file_type: String,
}

impl LexicalHit {
    /// Match quality in [0.5, 1.0].
    ///
    /// `0.5 + 0.5 * match_len / trimmed_line_len`: a match covering the
    /// whole line scores 1.0. Hits with an inconsistent span score 0.5.
    #[must_use]
    pub fn match_score(&self) -> f32 {
        let span_ok = self.match_start < self.match_end && self.match_end <= self.line.len();
        let line_len = self.line.trim().len();
        if !span_ok || line_len == 0 {
            return 0.5;
        }
        let coverage = (self.match_end - self.match_start) as f32 / line_len as f32;
        (0.5 + 0.5 * coverage).clamp(0.0, 1.0)
    }
}

#[async_trait]
pub trait TextSearch: Send + Sync {
    /// Returns up to `top_k` matches for `query`, best first.
    async fn search_files(&self, query: &str, top_k: usize) -> TextSearchResult<Vec<LexicalHit>>;
}

/// Runs a text search under a deadline, mapping expiry to [`TextSearchError::Timeout`].
pub async fn search_with_timeout(
    backend: &dyn TextSearch,
    query: &str,
    top_k: usize,
    timeout: Duration,
) -> TextSearchResult<Vec<LexicalHit>> {
    match tokio::time::timeout(timeout, backend.search_files(query, top_k)).await {
        Ok(result) => result,
        Err(_) => Err(TextSearchError::Timeout(timeout)),
    }
}
