//! Mock collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use coderecall::embedding::{ContextType, EmbeddingProvider};
use coderecall::error::{EmbeddingError, EmbeddingResult, KvError, KvResult, TextSearchResult};
use coderecall::kv::{KeyValueStore, MemoryStore};
use coderecall::search::{HybridSearch, HybridSearchConfig};
use coderecall::text::{LexicalHit, TextSearch};
use coderecall::vector::{VectorDimension, VectorStore, VectorStoreConfig};
use coderecall::{CacheConfig, SearchCache};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn dim(d: usize) -> VectorDimension {
    VectorDimension::new(d).expect("non-zero dimension")
}

pub fn lexical_hit(file: &str, line_number: usize, line: &str, needle: &str) -> LexicalHit {
    let start = line.find(needle).unwrap_or(0);
    LexicalHit {
        file: file.to_string(),
        line_number,
        line: line.to_string(),
        matched_text: needle.to_string(),
        match_start: start,
        match_end: start + needle.len(),
        file_type: file.rsplit('.').next().unwrap_or_default().to_string(),
    }
}

/// Returns the same hits for every query.
pub struct StaticTextSearch {
    hits: Vec<LexicalHit>,
    pub calls: AtomicUsize,
}

impl StaticTextSearch {
    pub fn new(hits: Vec<LexicalHit>) -> Self {
        Self {
            hits,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl TextSearch for StaticTextSearch {
    async fn search_files(&self, _query: &str, top_k: usize) -> TextSearchResult<Vec<LexicalHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// Embeds known texts to fixed vectors and fails on anything else.
pub struct FixedEmbedder {
    dimension: VectorDimension,
    vectors: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize, vectors: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dimension: dim(dimension),
            vectors: vectors
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str, _context: ContextType) -> EmbeddingResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::Generation(format!("no vector for '{text}'")))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Every embed call fails.
pub struct FailingEmbedder {
    dimension: VectorDimension,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dim(dimension),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str, _context: ContextType) -> EmbeddingResult<Vec<f32>> {
        Err(EmbeddingError::Generation("model offline".to_string()))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Answers with a constant vector after `delay`.
pub struct SlowProvider {
    dimension: VectorDimension,
    delay: Duration,
}

impl SlowProvider {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self {
            dimension: dim(dimension),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    async fn embed(&self, _text: &str, _context: ContextType) -> EmbeddingResult<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![1.0; self.dimension.get()])
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "slow"
    }
}

/// A key-value backend that is never reachable.
pub struct FailingKv;

#[async_trait]
impl KeyValueStore for FailingKv {
    async fn get(&self, _key: &str) -> KvResult<Option<Vec<u8>>> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> KvResult<()> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> KvResult<()> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> KvResult<bool> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }

    async fn keys(&self, _pattern: &str) -> KvResult<Vec<String>> {
        Err(KvError::Unavailable("connection refused".to_string()))
    }
}

/// Compute function for the cache that counts its invocations.
pub async fn counting_compute(
    counter: &AtomicUsize,
    value: Vec<f32>,
) -> Result<Vec<f32>, EmbeddingError> {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(value)
}

pub fn store_on(kv: Arc<dyn KeyValueStore>, dimension: usize) -> Arc<VectorStore> {
    Arc::new(VectorStore::new(kv, VectorStoreConfig::new(dim(dimension))))
}

/// Everything a test needs to drive the orchestrator.
pub struct Harness {
    pub kv: Arc<dyn KeyValueStore>,
    pub store: Arc<VectorStore>,
    pub search: HybridSearch,
}

pub fn harness_with(
    kv: Arc<dyn KeyValueStore>,
    provider: Arc<dyn EmbeddingProvider>,
    text: Arc<dyn TextSearch>,
    config: HybridSearchConfig,
) -> Harness {
    let store = store_on(kv.clone(), provider.dimension().get());
    let cache = Arc::new(SearchCache::new(kv.clone(), CacheConfig::default()));
    let search = HybridSearch::new(store.clone(), provider, text, cache, config);
    Harness { kv, store, search }
}

pub fn harness(provider: Arc<dyn EmbeddingProvider>, text: Arc<dyn TextSearch>) -> Harness {
    harness_with(
        Arc::new(MemoryStore::new()),
        provider,
        text,
        HybridSearchConfig::default(),
    )
}
