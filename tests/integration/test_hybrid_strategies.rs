//! Orchestrator strategies, degradation and metrics

use crate::common::{
    FailingEmbedder, FailingKv, FixedEmbedder, SlowProvider, StaticTextSearch, harness,
    harness_with, lexical_hit,
};
use coderecall::kv::MemoryStore;
use coderecall::search::{HealthStatus, HybridSearchConfig, ResultSource, SearchStrategy};
use coderecall::vector::Metadata;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

const QUERY: &str = "load config";

fn embedder() -> Arc<FixedEmbedder> {
    Arc::new(FixedEmbedder::new(
        3,
        &[(QUERY, vec![1.0, 0.0, 0.0]), ("other", vec![0.0, 1.0, 0.0])],
    ))
}

fn config_lines() -> Vec<coderecall::LexicalHit> {
    vec![
        lexical_hit("src/config.rs", 4, "fn load config()", "load config"),
        lexical_hit("src/main.rs", 12, "let settings = load config here", "load config"),
        lexical_hit("README.md", 1, "how to load config", "load config"),
    ]
}

#[tokio::test]
async fn test_semantic_first_backfills_from_lexical() {
    let text = Arc::new(StaticTextSearch::new(vec![
        lexical_hit("src/a.rs", 1, "load config", "load config"),
        lexical_hit("src/b.rs", 2, "load config", "load config"),
    ]));
    let h = harness(embedder(), text);
    assert!(
        h.store
            .store_vector(
                "sem",
                &[1.0, 0.0, 0.0],
                Metadata::for_file("src/sem.rs", "semantic doc", "rs"),
                None,
            )
            .await
    );

    let results = h.search.search(QUERY, 3, "semantic_first", None).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].file, "src/sem.rs");
    assert_eq!(results[0].source, ResultSource::Semantic);
    assert!(results[1..].iter().all(|r| r.source == ResultSource::Lexical));
}

#[tokio::test]
async fn test_combined_boosts_files_found_by_both_legs() {
    let h = harness(embedder(), Arc::new(StaticTextSearch::new(config_lines())));
    assert!(
        h.store
            .store_vector(
                "config",
                &[1.0, 0.0, 0.0],
                Metadata::for_file("src/config.rs", "fn load config()", "rs"),
                None,
            )
            .await
    );

    let results = h.search.search(QUERY, 10, "combined", None).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].file, "src/config.rs");
    assert_eq!(results[0].source, ResultSource::Both);
    let meta = &results[0].hybrid_metadata;
    assert!(meta.combined_score >= meta.semantic_contribution);
    assert!(meta.combined_score >= meta.text_contribution);
    assert!(
        results
            .windows(2)
            .all(|w| w[0].combined_score() >= w[1].combined_score())
    );

    let parallel = h.search.search(QUERY, 10, "parallel", None).await;
    let files = |rs: &[coderecall::MergedResult]| -> Vec<String> {
        rs.iter().map(|r| r.file.clone()).collect()
    };
    assert_eq!(files(&results), files(&parallel));
}

#[tokio::test]
async fn test_text_first_keeps_lexical_order_and_adds_semantic_files() {
    let h = harness(embedder(), Arc::new(StaticTextSearch::new(config_lines())));
    assert!(
        h.store
            .store_vector(
                "extra",
                &[0.9, 0.1, 0.0],
                Metadata::for_file("src/loader.rs", "loader", "rs"),
                None,
            )
            .await
    );

    let results = h.search.search(QUERY, 4, "text_first", None).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().any(|r| r.file == "src/loader.rs"));
    let files: std::collections::HashSet<&str> = results.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files.len(), results.len());
}

#[tokio::test]
async fn test_embedding_failure_empties_every_strategy() {
    let h = harness(
        Arc::new(FailingEmbedder::new(3)),
        Arc::new(StaticTextSearch::new(config_lines())),
    );

    for strategy in SearchStrategy::KNOWN {
        let results = h.search.search(QUERY, 5, strategy.as_str(), None).await;
        assert!(results.is_empty(), "{strategy} should degrade to no results");
    }

    let metrics = h.search.get_metrics();
    assert_eq!(metrics.total_searches, 4);
    assert_eq!(metrics.degraded_searches, 4);
}

#[tokio::test]
async fn test_unknown_strategy_returns_nothing() {
    let text = Arc::new(StaticTextSearch::new(config_lines()));
    let h = harness(embedder(), text.clone());

    assert!(h.search.search(QUERY, 5, "fuzzy", None).await.is_empty());
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.search.get_metrics().unknown_strategy_searches, 1);
}

#[tokio::test]
async fn test_slow_embedder_times_out_into_empty_results() {
    let config = HybridSearchConfig {
        timeout: Duration::from_millis(20),
        ..HybridSearchConfig::default()
    };
    let h = harness_with(
        Arc::new(MemoryStore::new()),
        Arc::new(SlowProvider::new(3, Duration::from_millis(500))),
        Arc::new(StaticTextSearch::new(config_lines())),
        config,
    );

    let results = h.search.search(QUERY, 5, "combined", None).await;

    assert!(results.is_empty());
    assert_eq!(h.search.get_metrics().degraded_searches, 1);
}

#[tokio::test]
async fn test_unreachable_kv_falls_back_to_lexical_results() {
    let h = harness_with(
        Arc::new(FailingKv),
        embedder(),
        Arc::new(StaticTextSearch::new(config_lines())),
        HybridSearchConfig::default(),
    );

    let results = h.search.search(QUERY, 5, "combined", None).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.source == ResultSource::Lexical));
    assert!(h.search.get_cache_stats().errors > 0);
}

#[tokio::test]
async fn test_health_reports_unreachable_kv_as_degraded() {
    let h = harness_with(
        Arc::new(FailingKv),
        embedder(),
        Arc::new(StaticTextSearch::empty()),
        HybridSearchConfig::default(),
    );

    let report = h.search.health_check().await;

    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(
        report.components["vector_store"].status,
        HealthStatus::Degraded
    );
    assert_eq!(report.components["cache"].status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_metrics_never_decrease() {
    let h = harness(embedder(), Arc::new(StaticTextSearch::new(config_lines())));

    let mut previous = h.search.get_metrics();
    for (query, strategy) in [
        (QUERY, "combined"),
        (QUERY, "combined"),
        ("other", "text_first"),
        ("missing", "parallel"),
        (QUERY, "nope"),
    ] {
        h.search.search(query, 5, strategy, None).await;
        let current = h.search.get_metrics();
        assert_eq!(current.total_searches, previous.total_searches + 1);
        assert!(current.successful_searches >= previous.successful_searches);
        assert!(current.degraded_searches >= previous.degraded_searches);
        previous = current;
    }

    assert_eq!(previous.total_searches, 5);
    assert_eq!(previous.popular_queries[0].query, QUERY);
    assert_eq!(previous.popular_queries[0].count, 3);
    assert!(previous.last_search_at.is_some());
    assert!(previous.cache_hit_rate > 0.0);
}

#[tokio::test]
async fn test_batch_search_preserves_order() {
    let h = harness(embedder(), Arc::new(StaticTextSearch::new(config_lines())));
    let queries = vec![QUERY.to_string(), "unknown text".to_string(), String::new()];

    let results = h.search.batch_search(&queries, 2, "combined").await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].len(), 2);
    assert!(results[1].is_empty());
    assert!(results[2].is_empty());
}
