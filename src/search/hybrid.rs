//! Hybrid search orchestrator.
//!
//! [`HybridSearch`] is the public entry point. It embeds the query through
//! the cache, runs the semantic and lexical legs as the strategy dictates,
//! merges them, and records metrics. Collaborator failures stop at this
//! boundary: `search()` answers with an empty list instead of an error.

use crate::batch::BatchProcessor;
use crate::cache::{CacheStats, SearchCache};
use crate::embedding::{ContextType, EmbeddingProvider, embed_with_timeout};
use crate::error::{CacheResult, EmbeddingResult, SearchResult};
use crate::search::fusion::{self, resolve_ratio};
use crate::search::health::{ComponentHealth, HealthReport};
use crate::search::metrics::{MetricsSnapshot, SearchMetrics, SearchOutcome};
use crate::search::rerank::ContextualReranker;
use crate::search::strategy::SearchStrategy;
use crate::search::types::MergedResult;
use crate::text::{LexicalHit, TextSearch, search_with_timeout};
use crate::vector::{Metadata, NamespaceStatus, SemanticHit, VectorResult, VectorStore};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Relative weight of the semantic leg; need not sum to 1 with `text_weight`.
    pub semantic_weight: f32,
    pub text_weight: f32,
    /// Deadline for each embedding and text search call.
    pub timeout: Duration,
    /// Minimum similarity for semantic files folded in by `text_first`.
    pub relevance_threshold: f32,
    /// Namespace searched; `None` uses the store's default.
    pub namespace: Option<String>,
    /// Context type used to embed queries.
    pub query_context: ContextType,
    pub popular_queries_limit: usize,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            text_weight: 0.4,
            timeout: Duration::from_secs(5),
            relevance_threshold: 0.0,
            namespace: None,
            query_context: ContextType::Generic,
            popular_queries_limit: 10,
        }
    }
}

/// Owned handles to every collaborator. Cloning is cheap.
#[derive(Clone)]
pub struct HybridSearch {
    store: Arc<VectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    text: Arc<dyn TextSearch>,
    cache: Arc<SearchCache>,
    metrics: Arc<SearchMetrics>,
    reranker: ContextualReranker,
    batch: BatchProcessor,
    config: HybridSearchConfig,
}

impl std::fmt::Debug for HybridSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearch")
            .field("store", &self.store)
            .field("model", &self.provider.model_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HybridSearch {
    #[must_use]
    pub fn new(
        store: Arc<VectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        text: Arc<dyn TextSearch>,
        cache: Arc<SearchCache>,
        config: HybridSearchConfig,
    ) -> Self {
        if provider.dimension() != store.dimension() {
            warn!(
                "Embedding model {} produces {} dimensions but the store expects {}; semantic search will degrade",
                provider.model_name(),
                provider.dimension(),
                store.dimension()
            );
        }
        Self {
            store,
            provider,
            text,
            cache,
            metrics: Arc::new(SearchMetrics::new(config.popular_queries_limit)),
            reranker: ContextualReranker::default(),
            batch: BatchProcessor::default(),
            config,
        }
    }

    #[must_use]
    pub fn with_batch_processor(mut self, batch: BatchProcessor) -> Self {
        self.batch = batch;
        self
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: ContextualReranker) -> Self {
        self.reranker = reranker;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Runs `query` under `strategy` and returns at most `top_k` results.
    ///
    /// Never fails: an unknown strategy, an empty query, or any collaborator
    /// error yields an empty list. `semantic_ratio` overrides the configured
    /// weights and is clamped to [0, 1].
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        strategy: &str,
        semantic_ratio: Option<f32>,
    ) -> Vec<MergedResult> {
        let started = Instant::now();
        let strategy = SearchStrategy::parse(strategy);
        if !strategy.is_known() {
            debug!("Unknown search strategy '{strategy}', returning no results");
            self.metrics.record(
                strategy.as_str(),
                query,
                started.elapsed(),
                SearchOutcome::UnknownStrategy,
            );
            return Vec::new();
        }

        let ratio = resolve_ratio(
            semantic_ratio,
            self.config.semantic_weight,
            self.config.text_weight,
        );
        match self.search_cached(query, top_k, &strategy, ratio).await {
            Ok(results) => {
                let top_score = results
                    .iter()
                    .map(MergedResult::combined_score)
                    .reduce(f32::max);
                self.metrics.record(
                    strategy.as_str(),
                    query,
                    started.elapsed(),
                    SearchOutcome::Success { top_score },
                );
                results
            }
            Err(e) => {
                warn!(
                    "Search '{query}' ({strategy}) degraded to no results [{}]: {e}",
                    e.status_code()
                );
                self.metrics.record(
                    strategy.as_str(),
                    query,
                    started.elapsed(),
                    SearchOutcome::Degraded,
                );
                Vec::new()
            }
        }
    }

    /// Combined search for `2 * top_k` candidates, reranked against the files
    /// the caller is working in.
    pub async fn contextual_search(
        &self,
        query: &str,
        file_context: &[String],
        top_k: usize,
    ) -> Vec<MergedResult> {
        let candidates = self
            .search(
                query,
                top_k.saturating_mul(2),
                SearchStrategy::Combined.as_str(),
                None,
            )
            .await;
        self.reranker
            .rerank(query, candidates, file_context, top_k)
    }

    /// Runs several searches with bounded concurrency, preserving order.
    pub async fn batch_search(
        &self,
        queries: &[String],
        top_k: usize,
        strategy: &str,
    ) -> Vec<Vec<MergedResult>> {
        self.batch
            .batch_search(queries, |query| {
                let query = query.to_string();
                async move {
                    Ok::<_, std::convert::Infallible>(
                        self.search(&query, top_k, strategy, None).await,
                    )
                }
            })
            .await
    }

    /// Embeds several texts through the cache, failing on the first error.
    pub async fn batch_embed(
        &self,
        texts: &[String],
        context: ContextType,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.batch
            .batch_embeddings(texts, |text| {
                let text = text.to_string();
                async move { self.embed_cached(&text, context).await }
            })
            .await
    }

    /// Embeds `content` and stores it under `id` in the configured namespace.
    ///
    /// A successful store drops cached search results.
    pub async fn index_text(
        &self,
        id: &str,
        content: &str,
        metadata: Metadata,
        context: ContextType,
    ) -> bool {
        let embedding = match self.embed_cached(content, context).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Could not embed '{id}': {e}");
                return false;
            }
        };
        let stored = self
            .store
            .store_vector(id, &embedding, metadata, self.config.namespace.as_deref())
            .await;
        if stored {
            self.invalidate_results().await;
        }
        stored
    }

    /// Deletes `id` from the configured namespace, dropping cached search results.
    pub async fn delete_document(&self, id: &str) -> bool {
        let deleted = self
            .store
            .delete_vector(id, self.config.namespace.as_deref())
            .await;
        if deleted {
            self.invalidate_results().await;
        }
        deleted
    }

    /// Rebuilds the configured namespace and drops cached search results.
    pub async fn rebuild_index(&self) -> VectorResult<usize> {
        let namespace = self
            .config
            .namespace
            .as_deref()
            .unwrap_or(self.store.default_namespace());
        let count = self.store.rebuild_namespace(namespace).await?;
        self.invalidate_results().await;
        Ok(count)
    }

    async fn invalidate_results(&self) {
        if !self.cache.is_enabled() {
            return;
        }
        if let Err(e) = self.cache.clear_search_results().await {
            warn!("Cached search results may be stale: {e}");
        }
    }

    pub async fn health_check(&self) -> HealthReport {
        let mut components = BTreeMap::new();

        let vector_store = match tokio::time::timeout(
            self.config.timeout,
            self.store.get_stats(None),
        )
        .await
        {
            Ok(Ok(stats)) => {
                let corrupt: Vec<&str> = stats
                    .namespaces
                    .iter()
                    .filter(|ns| ns.status == NamespaceStatus::Corrupt)
                    .map(|ns| ns.namespace.as_str())
                    .collect();
                if corrupt.is_empty() {
                    ComponentHealth::healthy(format!(
                        "{} vectors, {} storage, {} dimensions",
                        stats.num_docs,
                        stats.storage_type.as_str(),
                        stats.dimensions
                    ))
                } else {
                    ComponentHealth::degraded(format!(
                        "corrupt namespaces: {}",
                        corrupt.join(", ")
                    ))
                }
            }
            Ok(Err(e)) => ComponentHealth::degraded(e.to_string()),
            Err(_) => ComponentHealth::degraded(format!(
                "stats timed out after {:?}",
                self.config.timeout
            )),
        };
        components.insert("vector_store".to_string(), vector_store);

        let cache = if !self.cache.is_enabled() {
            ComponentHealth::healthy("disabled")
        } else {
            match self.cache.ping().await {
                Ok(()) => ComponentHealth::healthy(format!(
                    "active, hit rate {:.2}",
                    self.cache.get_cache_stats().hit_rate
                )),
                Err(e) => ComponentHealth::degraded(e.to_string()),
            }
        };
        components.insert("cache".to_string(), cache);

        let embedding = if self.provider.dimension() == self.store.dimension() {
            ComponentHealth::healthy(format!(
                "{} ({} dimensions)",
                self.provider.model_name(),
                self.provider.dimension()
            ))
        } else {
            ComponentHealth::degraded(format!(
                "{} produces {} dimensions, store expects {}",
                self.provider.model_name(),
                self.provider.dimension(),
                self.store.dimension()
            ))
        };
        components.insert("embedding".to_string(), embedding);
        components.insert(
            "text_search".to_string(),
            ComponentHealth::healthy("configured"),
        );

        let report = HealthReport::from_components(components);
        if !report.is_healthy() {
            warn!("Health check degraded");
        }
        report
    }

    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.cache.get_cache_stats().hit_rate)
    }

    pub async fn clear_cache(&self) -> CacheResult<usize> {
        self.cache.clear_cache().await
    }

    #[must_use]
    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.get_cache_stats()
    }

    async fn search_cached(
        &self,
        query: &str,
        top_k: usize,
        strategy: &SearchStrategy,
        ratio: f32,
    ) -> SearchResult<Vec<MergedResult>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let namespace = self
            .config
            .namespace
            .as_deref()
            .unwrap_or(self.store.default_namespace());
        let tag = format!("{strategy}:{namespace}:k={top_k}:r={ratio:.4}");
        self.cache
            .get_or_compute_search_results(query, &tag, || {
                self.execute(query, top_k, strategy, ratio)
            })
            .await
    }

    async fn execute(
        &self,
        query: &str,
        top_k: usize,
        strategy: &SearchStrategy,
        ratio: f32,
    ) -> SearchResult<Vec<MergedResult>> {
        match strategy {
            SearchStrategy::Combined => {
                let (semantic, lexical) = tokio::try_join!(
                    self.semantic_leg(query, top_k),
                    self.lexical_leg(query, top_k)
                )?;
                let mut merged = fusion::merge_and_rank(semantic, lexical, ratio);
                merged.truncate(top_k);
                Ok(merged)
            }
            SearchStrategy::Parallel => {
                let mut semantic = {
                    let this = self.clone();
                    let query = query.to_string();
                    AbortOnDrop(tokio::spawn(async move {
                        this.semantic_leg(&query, top_k).await
                    }))
                };
                let mut lexical = {
                    let this = self.clone();
                    let query = query.to_string();
                    AbortOnDrop(tokio::spawn(async move {
                        this.lexical_leg(&query, top_k).await
                    }))
                };
                let (semantic, lexical) = tokio::join!(&mut semantic.0, &mut lexical.0);
                let mut merged = fusion::merge_and_rank(semantic??, lexical??, ratio);
                merged.truncate(top_k);
                Ok(merged)
            }
            SearchStrategy::SemanticFirst => {
                let semantic = self.semantic_leg(query, top_k).await?;
                let distinct: HashSet<&str> = semantic.iter().map(SemanticHit::file_key).collect();
                let lexical = if distinct.len() < top_k {
                    self.lexical_leg(query, top_k).await?
                } else {
                    Vec::new()
                };
                Ok(fusion::semantic_first(semantic, lexical, ratio, top_k))
            }
            SearchStrategy::TextFirst => {
                let lexical = self.lexical_leg(query, top_k).await?;
                let semantic = self.semantic_leg(query, top_k).await?;
                Ok(fusion::text_first(
                    lexical,
                    semantic,
                    ratio,
                    top_k,
                    self.config.relevance_threshold,
                ))
            }
            SearchStrategy::Unknown(_) => Ok(Vec::new()),
        }
    }

    async fn semantic_leg(&self, query: &str, top_k: usize) -> SearchResult<Vec<SemanticHit>> {
        let embedding = self.embed_cached(query, self.config.query_context).await?;
        let hits = self
            .store
            .search_vectors(&embedding, top_k, self.config.namespace.as_deref())
            .await?;
        debug!("Semantic leg returned {} hits", hits.len());
        Ok(hits)
    }

    async fn lexical_leg(&self, query: &str, top_k: usize) -> SearchResult<Vec<LexicalHit>> {
        let hits =
            search_with_timeout(self.text.as_ref(), query, top_k, self.config.timeout).await?;
        debug!("Lexical leg returned {} hits", hits.len());
        Ok(hits)
    }

    async fn embed_cached(&self, text: &str, context: ContextType) -> EmbeddingResult<Vec<f32>> {
        let model = self.provider.model_for(context);
        self.cache
            .get_or_compute_embedding(text, model, || {
                embed_with_timeout(self.provider.as_ref(), text, context, self.config.timeout)
            })
            .await
    }
}

/// Aborts a spawned search leg when the awaiting search is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
