//! Error types for the hybrid search engine
//!
//! This module provides structured error types using thiserror for the
//! collaborator boundaries (key-value store, embedding provider, text search)
//! and for the orchestrator. Vector store errors live in `vector::types`
//! next to the types they validate.

use crate::vector::VectorError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a key-value backend
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Key-value backend unavailable: {0}\nSuggestion: Check that the backing store is reachable")]
    Unavailable(String),

    #[error("Key-value operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Failed to access store file: {0}\nSuggestion: Check disk space and file permissions")]
    Io(#[from] std::io::Error),

    #[error(
        "Store snapshot is corrupted: {0}\nSuggestion: Delete the snapshot file to start with an empty store"
    )]
    Corrupted(String),
}

/// Errors raised by an embedding provider
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Unknown embedding model '{0}'\nSuggestion: Use one of AllMiniLML6V2, BGESmallENV15, BGEBaseENV15, NomicEmbedTextV15"
    )]
    UnknownModel(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    Generation(String),

    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Use providers built on the same embedding dimension"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown context type '{0}'\nSuggestion: Use one of code, docs, generic")]
    UnknownContext(String),

    #[error("Embedding request timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised by a text search backend
#[derive(Error, Debug)]
pub enum TextSearchError {
    #[error("Text search failed while reading the workspace: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid search pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Text search backend unavailable: {0}")]
    Unavailable(String),

    #[error("Text search timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised by the search cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] KvError),

    #[error("Cached value could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised inside a search call before they are converted to a soft failure
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding step failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store step failed: {0}")]
    Vector(#[from] VectorError),

    #[error("Text search step failed: {0}")]
    Text(#[from] TextSearchError),

    #[error("Cache step failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Search task was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SearchError {
    /// Get a stable status code for this error type.
    ///
    /// Used in log lines and JSON output for programmatic handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::Embedding(EmbeddingError::Timeout(_))
            | Self::Text(TextSearchError::Timeout(_)) => "BACKEND_TIMEOUT",
            Self::Embedding(_) => "EMBEDDING_UNAVAILABLE",
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "VECTOR_STORE_UNAVAILABLE",
            Self::Text(_) => "TEXT_SEARCH_UNAVAILABLE",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Join(_) => "TASK_CANCELLED",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Embedding(_) => vec![
                "Check the embedding provider configuration in .coderecall/settings.toml",
                "Switch to the offline 'hash' provider if the model cannot be downloaded",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) => vec![
                "Re-index with the same embedding model used for the stored vectors",
            ],
            Self::Vector(_) => vec![
                "Run 'coderecall stats' to find corrupted namespaces",
                "Re-index the affected namespace",
            ],
            Self::Text(_) => vec!["Check that the workspace root exists and is readable"],
            _ => vec![],
        }
    }
}

/// Result type alias for key-value operations
pub type KvResult<T> = Result<T, KvError>;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Result type alias for text search operations
pub type TextSearchResult<T> = Result<T, TextSearchError>;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = SearchError::from(EmbeddingError::Timeout(Duration::from_millis(10)));
        assert_eq!(err.status_code(), "BACKEND_TIMEOUT");

        let err = SearchError::from(VectorError::DimensionMismatch {
            expected: 3,
            actual: 2,
        });
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert!(!err.recovery_suggestions().is_empty());

        let err = SearchError::from(TextSearchError::Unavailable("down".to_string()));
        assert_eq!(err.status_code(), "TEXT_SEARCH_UNAVAILABLE");
    }

    #[test]
    fn test_messages_carry_suggestions() {
        let err = KvError::Unavailable("connection refused".to_string());
        assert!(err.to_string().contains("Suggestion:"));
    }
}
