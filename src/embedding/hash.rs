//! Deterministic feature-hashing embeddings.
//!
//! Each lowercase word token is hashed with SHA-256 into a signed bucket.
//! No model download is needed, vectors are stable across runs, and texts
//! sharing vocabulary score high. Useful offline and in tests.

use crate::embedding::{ContextType, EmbeddingProvider};
use crate::error::EmbeddingResult;
use crate::vector::{VectorDimension, normalized};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: VectorDimension,
    model_name: String,
}

impl HashEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            model_name: format!("hash-{dimension}"),
        }
    }

    /// Synchronous embedding, also used by the async trait method.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut vector = vec![0.0f32; dim];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = digest[..8]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[(bucket % dim as u64) as usize] += sign;
        }

        normalized(&vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str, context: ContextType) -> EmbeddingResult<Vec<f32>> {
        Ok(self.embed_text(context.truncate(text)))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
