//! Embedding providers.
//!
//! A provider turns text into a fixed-length float vector. The dimension is
//! fixed for the lifetime of a provider and must match the vector store's.
//! Text is prepared per [`ContextType`] through a static strategy table
//! before it reaches the model.

mod fastembed_provider;
mod hash;
mod router;

pub use fastembed_provider::{FastEmbedProvider, models_dir, parse_embedding_model};
pub use hash::HashEmbeddingProvider;
pub use router::EmbeddingRouter;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::vector::VectorDimension;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What kind of text is being embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Code,
    Docs,
    Generic,
}

/// Text preparation applied before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStrategy {
    /// Instruction prefix for models trained with one.
    pub prefix: &'static str,
    /// Input is truncated to this many characters.
    pub max_chars: usize,
}

const CODE_STRATEGY: ContextStrategy = ContextStrategy {
    prefix: "code: ",
    max_chars: 2048,
};

const DOCS_STRATEGY: ContextStrategy = ContextStrategy {
    prefix: "docs: ",
    max_chars: 4096,
};

const GENERIC_STRATEGY: ContextStrategy = ContextStrategy {
    prefix: "",
    max_chars: 4096,
};

impl ContextType {
    pub const ALL: [ContextType; 3] = [Self::Code, Self::Docs, Self::Generic];

    #[must_use]
    pub fn strategy(self) -> &'static ContextStrategy {
        match self {
            Self::Code => &CODE_STRATEGY,
            Self::Docs => &DOCS_STRATEGY,
            Self::Generic => &GENERIC_STRATEGY,
        }
    }

    /// Truncates `text` to the context's character limit.
    #[must_use]
    pub fn truncate(self, text: &str) -> &str {
        let max = self.strategy().max_chars;
        match text.char_indices().nth(max) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }

    /// Truncates and prefixes `text` for instruction-tuned models.
    #[must_use]
    pub fn prepare(self, text: &str) -> String {
        format!("{}{}", self.strategy().prefix, self.truncate(text))
    }

    /// Picks a context from a file extension.
    #[must_use]
    pub fn for_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "md" | "markdown" | "rst" | "txt" | "adoc" => Self::Docs,
            "" => Self::Generic,
            _ => Self::Code,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Docs => "docs",
            Self::Generic => "generic",
        }
    }
}

impl FromStr for ContextType {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "docs" | "documentation" => Ok(Self::Docs),
            "generic" | "text" => Ok(Self::Generic),
            _ => Err(EmbeddingError::UnknownContext(s.to_string())),
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe. Blocking model inference belongs on
/// a blocking thread, not on the async executor.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text.
    async fn embed(&self, text: &str, context: ContextType) -> EmbeddingResult<Vec<f32>>;

    /// Get the dimension of embeddings produced by this provider.
    fn dimension(&self) -> VectorDimension;

    fn model_name(&self) -> &str;

    /// Model that serves `context`; used to key cached embeddings.
    fn model_for(&self, _context: ContextType) -> &str {
        self.model_name()
    }
}

/// Embeds `text` under a deadline, mapping expiry to [`EmbeddingError::Timeout`].
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    context: ContextType,
    timeout: Duration,
) -> EmbeddingResult<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text, context)).await {
        Ok(result) => result,
        Err(_) => Err(EmbeddingError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_table() {
        assert_eq!(ContextType::Code.strategy().prefix, "code: ");
        assert_eq!(ContextType::Generic.strategy().prefix, "");
        assert!(ContextType::Docs.strategy().max_chars > ContextType::Code.strategy().max_chars);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(3000);
        let truncated = ContextType::Code.truncate(&text);
        assert_eq!(truncated.chars().count(), 2048);
        assert_eq!(ContextType::Code.truncate("short"), "short");
        assert_eq!(ContextType::Docs.prepare("intro"), "docs: intro");
    }

    #[test]
    fn test_parse_context() {
        assert_eq!("code".parse::<ContextType>().unwrap(), ContextType::Code);
        assert_eq!("Docs".parse::<ContextType>().unwrap(), ContextType::Docs);
        assert!(matches!(
            "binary".parse::<ContextType>(),
            Err(EmbeddingError::UnknownContext(_))
        ));
    }

    #[test]
    fn test_context_for_extension() {
        assert_eq!(ContextType::for_extension("rs"), ContextType::Code);
        assert_eq!(ContextType::for_extension("MD"), ContextType::Docs);
        assert_eq!(ContextType::for_extension(""), ContextType::Generic);
    }

    #[tokio::test]
    async fn test_embed_with_timeout() {
        let provider = HashEmbeddingProvider::new(VectorDimension::new(8).unwrap());
        let v = embed_with_timeout(
            &provider,
            "fn main",
            ContextType::Code,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(v.len(), 8);
    }
}
