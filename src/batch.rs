//! Order-preserving fan-out over single-item embed and search calls.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::future::Future;
use tracing::warn;

/// Runs up to `concurrency` items at once; output order always matches input order.
#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor {
    concurrency: usize,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl BatchProcessor {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Embeds every text, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first error produced by `embed_fn`. In-flight items are dropped.
    pub async fn batch_embeddings<T, F, Fut, E>(
        &self,
        texts: &[T],
        embed_fn: F,
    ) -> Result<Vec<Vec<f32>>, E>
    where
        T: AsRef<str>,
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<Vec<f32>, E>>,
    {
        stream::iter(texts.iter().map(|t| embed_fn(t.as_ref())))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// Runs every query; a failing query yields an empty list in its slot.
    pub async fn batch_search<Q, R, F, Fut, E>(&self, queries: &[Q], search_fn: F) -> Vec<Vec<R>>
    where
        Q: AsRef<str>,
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<Vec<R>, E>>,
        E: std::fmt::Display,
    {
        stream::iter(queries.iter().map(|q| {
            let query = q.as_ref();
            let fut = search_fn(query);
            async move {
                fut.await.unwrap_or_else(|e| {
                    warn!("Batch search for '{query}' failed: {e}");
                    Vec::new()
                })
            }
        }))
        .buffered(self.concurrency)
        .collect()
        .await
    }
}
