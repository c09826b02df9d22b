//! Line-oriented regex search over a workspace tree.

use crate::error::{TextSearchError, TextSearchResult};
use crate::text::{LexicalHit, TextSearch};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Files larger than this are skipped.
const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Greps the workspace, honoring `.gitignore` and hidden-file rules.
///
/// The query is compiled as a case-insensitive regex; when it is not a
/// valid regex it is matched literally.
#[derive(Debug, Clone)]
pub struct WorkspaceGrep {
    root: PathBuf,
    max_file_bytes: u64,
}

impl WorkspaceGrep {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compiles `query`, falling back to a literal match when it is not a
    /// valid regex or when it matches the empty string.
    fn compile(query: &str) -> TextSearchResult<Regex> {
        let literal = || {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        };
        match RegexBuilder::new(query).case_insensitive(true).build() {
            Ok(pattern) if !pattern.is_match("") => Ok(pattern),
            Ok(_) => {
                debug!("Pattern '{query}' matches empty text, searching literally");
                literal()
            }
            Err(_) => literal(),
        }
        .map_err(|e| TextSearchError::InvalidPattern {
            pattern: query.to_string(),
            reason: e.to_string(),
        })
    }

    fn search_blocking(
        root: &Path,
        max_file_bytes: u64,
        pattern: &Regex,
        top_k: usize,
    ) -> TextSearchResult<Vec<LexicalHit>> {
        if !root.exists() {
            return Err(TextSearchError::Unavailable(format!(
                "workspace root '{}' does not exist",
                root.display()
            )));
        }

        let mut hits = Vec::new();
        let walker = WalkBuilder::new(root)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            if entry
                .metadata()
                .map(|m| m.len() > max_file_bytes)
                .unwrap_or(true)
            {
                continue;
            }
            // Binary and non-UTF-8 files are not searchable
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };

            let file = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let file_type = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();

            for (idx, line) in content.lines().enumerate() {
                // Zero-width matches carry no signal
                let Some(m) = pattern.find_iter(line).find(|m| !m.is_empty()) else {
                    continue;
                };
                hits.push(LexicalHit {
                    file: file.clone(),
                    line_number: idx + 1,
                    line: line.to_string(),
                    matched_text: m.as_str().to_string(),
                    match_start: m.start(),
                    match_end: m.end(),
                    file_type: file_type.clone(),
                });
                if hits.len() >= top_k {
                    return Ok(hits);
                }
            }
        }

        Ok(hits)
    }
}

#[async_trait]
impl TextSearch for WorkspaceGrep {
    async fn search_files(&self, query: &str, top_k: usize) -> TextSearchResult<Vec<LexicalHit>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let pattern = Self::compile(query)?;
        let root = self.root.clone();
        let max_file_bytes = self.max_file_bytes;

        tokio::task::spawn_blocking(move || {
            Self::search_blocking(&root, max_file_bytes, &pattern, top_k)
        })
        .await
        .map_err(|e| TextSearchError::Unavailable(format!("search task failed: {e}")))?
    }
}
