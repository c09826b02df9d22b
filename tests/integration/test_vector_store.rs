//! Vector store behavior through the public API

use crate::common::{FailingKv, dim, store_on};
use coderecall::kv::{KeyValueStore, MemoryStore};
use coderecall::vector::{
    Metadata, NamespaceStatus, StorageType, VectorInput, VectorStore, VectorStoreConfig,
};
use std::sync::Arc;

fn doc_vectors() -> Vec<Vec<f32>> {
    vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
        vec![0.7, 0.7, 0.0],
        vec![0.0, 0.6, 0.8],
    ]
}

async fn seeded(kv: Arc<dyn KeyValueStore>, namespace: &str) -> Arc<VectorStore> {
    let store = store_on(kv, 3);
    for (i, v) in doc_vectors().iter().enumerate() {
        let id = format!("doc_{i}");
        let metadata = Metadata::for_file(&format!("src/doc_{i}.rs"), "preview", "rs");
        assert!(store.store_vector(&id, v, metadata, Some(namespace)).await);
    }
    store
}

#[tokio::test]
async fn test_exact_embedding_ranks_its_document_first() {
    let store = seeded(Arc::new(MemoryStore::new()), "test").await;

    let hits = store
        .search_vectors(&doc_vectors()[2], 5, Some("test"))
        .await
        .unwrap();

    assert_eq!(hits[0].id, "doc_2");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(hits[0].file_key(), "src/doc_2.rs");
}

#[tokio::test]
async fn test_namespaces_never_leak() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let store = seeded(kv, "alpha").await;
    assert!(
        store
            .store_vector("other", &[1.0, 0.0, 0.0], Metadata::new(), Some("beta"))
            .await
    );

    let alpha = store
        .search_vectors(&[1.0, 0.0, 0.0], 10, Some("alpha"))
        .await
        .unwrap();
    assert!(alpha.iter().all(|h| h.id != "other"));

    let beta = store
        .search_vectors(&[1.0, 0.0, 0.0], 10, Some("beta"))
        .await
        .unwrap();
    assert_eq!(beta.len(), 1);

    assert_eq!(store.get_stats(Some("alpha")).await.unwrap().num_docs, 5);
    assert_eq!(store.get_stats(Some("beta")).await.unwrap().num_docs, 1);
    let total = store.get_stats(None).await.unwrap();
    assert_eq!(total.num_docs, 6);
    assert_eq!(total.namespaces.len(), 2);
    assert_eq!(total.storage_type, StorageType::Hnsw);
}

#[tokio::test]
async fn test_wrong_dimension_creates_no_record() {
    let store = store_on(Arc::new(MemoryStore::new()), 3);

    assert!(
        !store
            .store_vector("bad", &[1.0, 0.0], Metadata::new(), None)
            .await
    );
    assert!(store.get_vector("bad", None).await.unwrap().is_none());
    assert!(
        store
            .search_vectors(&[1.0, 0.0], 5, None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = seeded(Arc::new(MemoryStore::new()), "test").await;

    assert!(store.delete_vector("doc_1", Some("test")).await);
    assert!(!store.delete_vector("doc_1", Some("test")).await);
    assert!(!store.delete_vector("missing", Some("test")).await);

    let hits = store
        .search_vectors(&doc_vectors()[1], 5, Some("test"))
        .await
        .unwrap();
    assert!(hits.iter().all(|h| h.id != "doc_1"));
}

#[tokio::test]
async fn test_bulk_store_is_best_effort() {
    let store = store_on(Arc::new(MemoryStore::new()), 3);
    let batch = vec![
        VectorInput {
            id: "ok".to_string(),
            embedding: vec![1.0, 0.0, 0.0],
            metadata: Metadata::new(),
            namespace: None,
        },
        VectorInput {
            id: "short".to_string(),
            embedding: vec![1.0],
            metadata: Metadata::new(),
            namespace: None,
        },
        VectorInput {
            id: "ok2".to_string(),
            embedding: vec![0.0, 1.0, 0.0],
            metadata: Metadata::new(),
            namespace: Some("bad:ns".to_string()),
        },
    ];

    assert_eq!(store.store_vectors(batch).await, 1);
}

#[tokio::test]
async fn test_unreachable_backend_degrades() {
    let store = store_on(Arc::new(FailingKv), 3);

    assert!(
        !store
            .store_vector("a", &[1.0, 0.0, 0.0], Metadata::new(), None)
            .await
    );
    let hits = store.search_vectors(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
    assert!(hits.is_empty());
    assert!(!store.delete_vector("a", None).await);
    assert!(store.get_stats(None).await.is_err());
}

#[tokio::test]
async fn test_corrupt_namespace_is_isolated() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let store = seeded(kv.clone(), "good").await;
    kv.set("vector:broken:x", b"not json".to_vec()).await.unwrap();

    // Fresh store so both namespaces load from the backend.
    let reopened = store_on(kv.clone(), 3);
    let broken = reopened
        .search_vectors(&[1.0, 0.0, 0.0], 3, Some("broken"))
        .await
        .unwrap();
    assert!(broken.is_empty());
    let good = reopened
        .search_vectors(&[1.0, 0.0, 0.0], 3, Some("good"))
        .await
        .unwrap();
    assert_eq!(good[0].id, "doc_0");

    assert_eq!(reopened.rebuild_namespace("broken").await.unwrap(), 0);
    assert!(
        reopened
            .store_vector("y", &[0.0, 1.0, 0.0], Metadata::new(), Some("broken"))
            .await
    );
    drop(store);
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let store = seeded(kv.clone(), "test").await;
    assert!(store.persist_index(Some("test")).await.unwrap());
    assert!(kv.get("index:test").await.unwrap().is_some());

    let reopened = store_on(kv, 3);
    let hits = reopened
        .search_vectors(&doc_vectors()[4], 1, Some("test"))
        .await
        .unwrap();
    assert_eq!(hits[0].id, "doc_4");
}

#[tokio::test]
async fn test_non_finite_vector_does_not_poison_namespace_on_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("store.bin");
    {
        let kv = Arc::new(MemoryStore::open(&path).unwrap());
        let store = store_on(kv.clone(), 3);
        assert!(
            store
                .store_vector("good", &[1.0, 0.0, 0.0], Metadata::new(), None)
                .await
        );
        assert!(
            !store
                .store_vector("bad", &[f32::NAN, 0.0, 0.0], Metadata::new(), None)
                .await
        );
        let nan_meta = Metadata::new().with("recency", f64::NAN);
        assert!(
            !store
                .store_vector("bad_meta", &[0.0, 1.0, 0.0], nan_meta, None)
                .await
        );
        store.persist_all().await.unwrap();
        kv.flush().unwrap();
    }

    let kv = Arc::new(MemoryStore::open(&path).unwrap());
    let reopened = store_on(kv, 3);
    let hits = reopened
        .search_vectors(&[1.0, 0.0, 0.0], 5, None)
        .await
        .unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["good"]);

    let stats = reopened.get_stats(None).await.unwrap();
    assert_eq!(stats.namespaces[0].status, NamespaceStatus::Ready);
    assert!(
        reopened
            .store_vector("next", &[0.0, 0.0, 1.0], Metadata::new(), None)
            .await
    );
}

#[tokio::test]
async fn test_exact_mode_reports_storage_type() {
    let mut config = VectorStoreConfig::new(dim(3));
    config.enable_hnsw = false;
    let store = VectorStore::new(Arc::new(MemoryStore::new()), config);
    assert!(
        store
            .store_vector("a", &[0.0, 0.0, 1.0], Metadata::new(), None)
            .await
    );

    let stats = store.get_stats(None).await.unwrap();
    assert_eq!(stats.storage_type, StorageType::Exact);
    assert!(!store.persist_index(None).await.unwrap());
}

#[tokio::test]
async fn test_concurrent_writes_and_reads() {
    let store = store_on(Arc::new(MemoryStore::new()), 3);
    let mut tasks = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let v = [1.0, i as f32 * 0.1, 0.0];
            store
                .store_vector(&format!("v{i}"), &v, Metadata::new(), None)
                .await;
            store.search_vectors(&v, 3, None).await.unwrap().len()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap() >= 1);
    }
    assert_eq!(store.get_stats(None).await.unwrap().num_docs, 20);
}
