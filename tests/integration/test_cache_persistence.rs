//! Cache semantics and on-disk state across store instances

use crate::common::{FailingKv, StaticTextSearch, counting_compute, lexical_hit, store_on};
use coderecall::embedding::{ContextType, HashEmbeddingProvider};
use coderecall::kv::{KeyValueStore, MemoryStore};
use coderecall::search::{HybridSearch, HybridSearchConfig};
use coderecall::vector::{Metadata, VectorDimension};
use coderecall::{CacheConfig, SearchCache, Settings};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_embedding_computed_at_most_once() {
    let cache = SearchCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
    let calls = AtomicUsize::new(0);

    let first = cache
        .get_or_compute_embedding("fn main", "m", || counting_compute(&calls, vec![0.5, 0.5]))
        .await
        .unwrap();
    let second = cache
        .get_or_compute_embedding("fn main", "m", || counting_compute(&calls, vec![9.0, 9.0]))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A different model is a different key.
    cache
        .get_or_compute_embedding("fn main", "other", || counting_compute(&calls, vec![1.0]))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_entries_are_recomputed() {
    let config = CacheConfig {
        embedding_ttl: Some(Duration::from_millis(30)),
        ..CacheConfig::default()
    };
    let cache = SearchCache::new(Arc::new(MemoryStore::new()), config);
    let calls = AtomicUsize::new(0);

    cache
        .get_or_compute_embedding("x", "m", || counting_compute(&calls, vec![1.0]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    cache
        .get_or_compute_embedding("x", "m", || counting_compute(&calls, vec![1.0]))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_cache_still_returns_computed_value() {
    let cache = SearchCache::new(Arc::new(FailingKv), CacheConfig::default());
    let calls = AtomicUsize::new(0);

    let value = cache
        .get_or_compute_embedding("x", "m", || counting_compute(&calls, vec![3.0]))
        .await
        .unwrap();

    assert_eq!(value, vec![3.0]);
    let stats = cache.get_cache_stats();
    assert_eq!(stats.cache_type, "kv");
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.errors, 2);
    assert!(cache.ping().await.is_err());
}

#[tokio::test]
async fn test_clear_cache_forces_recompute_of_search_results() {
    let dim = VectorDimension::new(32).unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let text = Arc::new(StaticTextSearch::new(vec![lexical_hit(
        "src/lib.rs",
        1,
        "pub mod cache;",
        "cache",
    )]));
    let search = HybridSearch::new(
        store_on(kv.clone(), 32),
        Arc::new(HashEmbeddingProvider::new(dim)),
        text.clone(),
        Arc::new(SearchCache::new(kv.clone(), CacheConfig::default())),
        HybridSearchConfig::default(),
    );

    search.search("cache", 5, "combined", None).await;
    search.search("cache", 5, "combined", None).await;
    assert_eq!(text.calls.load(Ordering::SeqCst), 1);

    let removed = search.clear_cache().await.unwrap();
    assert!(removed >= 2);
    search.search("cache", 5, "combined", None).await;
    assert_eq!(text.calls.load(Ordering::SeqCst), 2);

    // A different top_k is a different cache entry.
    search.search("cache", 3, "combined", None).await;
    assert_eq!(text.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_writes_invalidate_cached_search_results() {
    let dim = VectorDimension::new(32).unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let search = HybridSearch::new(
        store_on(kv.clone(), 32),
        Arc::new(HashEmbeddingProvider::new(dim)),
        Arc::new(StaticTextSearch::empty()),
        Arc::new(SearchCache::new(kv.clone(), CacheConfig::default())),
        HybridSearchConfig::default(),
    );

    assert!(search.search("load config", 5, "combined", None).await.is_empty());

    assert!(
        search
            .index_text(
                "src/config.rs",
                "load config settings",
                Metadata::for_file("src/config.rs", "load config settings", "rs"),
                ContextType::Code,
            )
            .await
    );
    let after_index = search.search("load config", 5, "combined", None).await;
    assert_eq!(after_index.len(), 1);
    assert_eq!(after_index[0].file, "src/config.rs");

    assert!(search.delete_document("src/config.rs").await);
    assert!(search.search("load config", 5, "combined", None).await.is_empty());

    // Embeddings survive invalidation; only result lists are dropped.
    assert!(!kv.keys("cache:emb:*").await.unwrap().is_empty());

    assert_eq!(search.rebuild_index().await.unwrap(), 0);
    assert!(kv.keys("cache:search:*").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_snapshot_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.bin");

    {
        let kv = Arc::new(MemoryStore::open(&path).unwrap());
        let store = store_on(kv.clone(), 3);
        assert!(
            store
                .store_vector(
                    "doc",
                    &[0.0, 1.0, 0.0],
                    Metadata::for_file("src/doc.rs", "doc", "rs"),
                    None,
                )
                .await
        );
        assert_eq!(store.persist_all().await.unwrap(), 1);
        kv.flush().unwrap();
    }

    let kv = Arc::new(MemoryStore::open(&path).unwrap());
    let store = store_on(kv, 3);
    let hits = store.search_vectors(&[0.0, 1.0, 0.0], 1, None).await.unwrap();
    assert_eq!(hits[0].id, "doc");
    assert_eq!(hits[0].file_key(), "src/doc.rs");
}

#[tokio::test]
async fn test_index_text_through_settings_wiring() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.workspace_root = Some(dir.path().to_path_buf());
    settings.vector_store.dimension = 16;

    let kv = Arc::new(MemoryStore::open(settings.snapshot_path()).unwrap());
    let dim = VectorDimension::new(16).unwrap();
    let store = Arc::new(coderecall::VectorStore::new(
        kv.clone(),
        settings.vector_store_config().unwrap(),
    ));
    let search = HybridSearch::new(
        store.clone(),
        Arc::new(HashEmbeddingProvider::new(dim)),
        Arc::new(StaticTextSearch::empty()),
        Arc::new(SearchCache::new(kv.clone(), settings.cache_config())),
        settings.hybrid_config(Some("docs".to_string())),
    );

    let indexed = search
        .index_text(
            "guide.md",
            "how to configure the cache",
            Metadata::for_file("guide.md", "how to configure", "md"),
            ContextType::Docs,
        )
        .await;

    assert!(indexed);
    assert_eq!(store.get_stats(Some("docs")).await.unwrap().num_docs, 1);
    assert_eq!(store.get_stats(Some("default")).await.unwrap().num_docs, 0);
}
