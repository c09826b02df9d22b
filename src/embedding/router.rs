//! Routes each context type to its own provider.

use crate::embedding::{ContextType, EmbeddingProvider};
use crate::error::{EmbeddingError, EmbeddingResult};
use crate::vector::VectorDimension;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Dispatches embeddings by [`ContextType`], falling back to a default provider.
///
/// Every routed provider must share the default provider's dimension so all
/// vectors land in the same space.
pub struct EmbeddingRouter {
    default: Arc<dyn EmbeddingProvider>,
    routes: HashMap<ContextType, Arc<dyn EmbeddingProvider>>,
}

impl EmbeddingRouter {
    #[must_use]
    pub fn new(default: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            default,
            routes: HashMap::new(),
        }
    }

    /// Routes `context` to `provider`.
    ///
    /// # Errors
    /// Fails when the provider's dimension differs from the default provider's.
    pub fn with_route(
        mut self,
        context: ContextType,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> EmbeddingResult<Self> {
        let expected = self.default.dimension().get();
        let actual = provider.dimension().get();
        if expected != actual {
            return Err(EmbeddingError::DimensionMismatch { expected, actual });
        }
        self.routes.insert(context, provider);
        Ok(self)
    }

    #[must_use]
    pub fn provider_for(&self, context: ContextType) -> &Arc<dyn EmbeddingProvider> {
        self.routes.get(&context).unwrap_or(&self.default)
    }

    /// Embeds `text` with the provider routed for `context`.
    pub async fn create_hybrid_embedding(
        &self,
        text: &str,
        context: ContextType,
    ) -> EmbeddingResult<Vec<f32>> {
        self.provider_for(context).embed(text, context).await
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingRouter {
    async fn embed(&self, text: &str, context: ContextType) -> EmbeddingResult<Vec<f32>> {
        self.create_hybrid_embedding(text, context).await
    }

    fn dimension(&self) -> VectorDimension {
        self.default.dimension()
    }

    fn model_name(&self) -> &str {
        self.default.model_name()
    }

    fn model_for(&self, context: ContextType) -> &str {
        self.provider_for(context).model_name()
    }
}
