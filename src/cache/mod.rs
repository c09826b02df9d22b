//! Compute-on-miss cache for embeddings and search results.
//!
//! Values are JSON documents in the key-value collaborator under
//! `cache:emb:{hash}` and `cache:search:{hash}`, where the hash is a SHA-256
//! of the key parts. The cache never fails a computation: a read or decode
//! failure counts as a miss, and a write failure is logged while the fresh
//! value is still returned. Concurrent identical misses may both compute.

use crate::error::{CacheError, CacheResult};
use crate::kv::{KeyValueStore, with_timeout};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const CACHE_PREFIX: &str = "cache:";
const EMBEDDING_PREFIX: &str = "cache:emb:";
const SEARCH_PREFIX: &str = "cache:search:";

/// Cache behavior knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// `None` keeps entries until cleared.
    pub embedding_ttl: Option<Duration>,
    pub results_ttl: Option<Duration>,
    /// Deadline applied to every key-value call.
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            results_ttl: Some(Duration::from_secs(60 * 60)),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Counters reported by [`SearchCache::get_cache_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_type: String,
    /// Label of the key-value backend, e.g. `memory`.
    pub backend: String,
    pub status: String,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    /// hits / (hits + misses), 0.0 before any lookup.
    pub hit_rate: f64,
}

/// SHA-256 over NUL-separated parts, as lowercase hex.
fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let result = hasher.finalize();
    format!("{result:x}")
}

pub struct SearchCache {
    kv: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache")
            .field("config", &self.config)
            .field("backend", &self.kv.backend_name())
            .finish_non_exhaustive()
    }
}

impl SearchCache {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            kv,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn embedding_key(text: &str, model: &str) -> String {
        format!("{EMBEDDING_PREFIX}{}", hash_key(&[model, text]))
    }

    #[must_use]
    pub fn search_key(query: &str, strategy: &str) -> String {
        format!("{SEARCH_PREFIX}{}", hash_key(&[strategy, query]))
    }

    /// Returns the cached embedding for `(text, model)` or computes and stores it.
    pub async fn get_or_compute_embedding<F, Fut, E>(
        &self,
        text: &str,
        model: &str,
        compute: F,
    ) -> Result<Vec<f32>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<f32>, E>>,
    {
        let key = Self::embedding_key(text, model);
        self.get_or_compute(&key, self.config.embedding_ttl, compute)
            .await
    }

    /// Returns cached results for `(query, strategy)` or runs the search and stores them.
    ///
    /// A failed search is returned as-is and never cached.
    pub async fn get_or_compute_search_results<T, F, Fut, E>(
        &self,
        query: &str,
        strategy: &str,
        search: F,
    ) -> Result<Vec<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let key = Self::search_key(query, strategy);
        self.get_or_compute(&key, self.config.results_ttl, search)
            .await
    }

    async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return compute().await;
        }

        match self.read::<T>(key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {key}");
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Cache read for {key} failed, recomputing: {e}");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = compute().await?;
        if let Err(e) = self.write(key, &value, ttl).await {
            self.errors.fetch_add(1, Ordering::Relaxed);
            warn!("Cache write for {key} failed: {e}");
        }
        Ok(value)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let bytes = with_timeout(self.config.timeout, "get", self.kv.get(key)).await?;
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(CacheError::from))
            .transpose()
    }

    async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        match ttl {
            Some(ttl) => {
                with_timeout(self.config.timeout, "setex", self.kv.set_ex(key, bytes, ttl)).await?
            }
            None => with_timeout(self.config.timeout, "set", self.kv.set(key, bytes)).await?,
        }
        Ok(())
    }

    /// Removes every cache entry. Returns how many were deleted.
    pub async fn clear_cache(&self) -> CacheResult<usize> {
        self.clear_prefix(CACHE_PREFIX).await
    }

    async fn clear_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let keys = with_timeout(
            self.config.timeout,
            "keys",
            self.kv.keys(&format!("{prefix}*")),
        )
        .await?;

        let mut removed = 0;
        for key in keys {
            if with_timeout(self.config.timeout, "delete", self.kv.delete(&key)).await? {
                removed += 1;
            }
        }
        debug!("Cleared {removed} cache entries under {prefix}");
        Ok(removed)
    }

    /// Removes cached search results only, keeping embeddings.
    pub async fn clear_search_results(&self) -> CacheResult<usize> {
        self.clear_prefix(SEARCH_PREFIX).await
    }

    /// Round-trips a read against the backend.
    pub async fn ping(&self) -> CacheResult<()> {
        with_timeout(self.config.timeout, "get", self.kv.get(&format!("{CACHE_PREFIX}ping")))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn get_cache_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            cache_type: "kv".to_string(),
            backend: self.kv.backend_name().to_string(),
            status: if self.config.enabled {
                "active".to_string()
            } else {
                "disabled".to_string()
            },
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }
}
