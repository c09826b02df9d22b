//! Search counters. Every `search()` call is recorded exactly once.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// How a recorded search ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchOutcome {
    /// Completed; carries the best score, `None` for an empty list.
    Success { top_score: Option<f32> },
    /// A collaborator failed and the call returned `[]`.
    Degraded,
    UnknownStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularQuery {
    pub query: String,
    pub count: u64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_searches: u64,
    pub successful_searches: u64,
    pub degraded_searches: u64,
    pub unknown_strategy_searches: u64,
    pub strategy_counts: BTreeMap<String, u64>,
    pub avg_latency_ms: f64,
    /// Mean best score over successful searches; empty results count as 0.
    pub avg_quality: f64,
    pub popular_queries: Vec<PopularQuery>,
    pub cache_hit_rate: f64,
    pub last_search_at: Option<String>,
}

#[derive(Debug, Default)]
struct MetricsState {
    total: u64,
    successful: u64,
    degraded: u64,
    unknown_strategy: u64,
    strategy_counts: BTreeMap<String, u64>,
    latency_total_ms: f64,
    quality_total: f64,
    query_counts: HashMap<String, u64>,
    last_search_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SearchMetrics {
    state: Mutex<MetricsState>,
    popular_limit: usize,
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new(10)
    }
}

impl SearchMetrics {
    #[must_use]
    pub fn new(popular_limit: usize) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            popular_limit,
        }
    }

    pub fn record(&self, strategy: &str, query: &str, latency: Duration, outcome: SearchOutcome) {
        let mut state = self.state.lock();
        state.total += 1;
        *state.strategy_counts.entry(strategy.to_string()).or_insert(0) += 1;
        state.latency_total_ms += latency.as_secs_f64() * 1000.0;
        state.last_search_at = Some(Utc::now());

        let query = query.trim();
        if !query.is_empty() {
            *state.query_counts.entry(query.to_string()).or_insert(0) += 1;
        }

        match outcome {
            SearchOutcome::Success { top_score } => {
                state.successful += 1;
                state.quality_total += f64::from(top_score.unwrap_or(0.0));
            }
            SearchOutcome::Degraded => state.degraded += 1,
            SearchOutcome::UnknownStrategy => state.unknown_strategy += 1,
        }
    }

    /// Snapshot of all counters; `cache_hit_rate` comes from the cache.
    #[must_use]
    pub fn snapshot(&self, cache_hit_rate: f64) -> MetricsSnapshot {
        let state = self.state.lock();

        let mut popular: Vec<PopularQuery> = state
            .query_counts
            .iter()
            .map(|(query, &count)| PopularQuery {
                query: query.clone(),
                count,
            })
            .collect();
        popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        popular.truncate(self.popular_limit);

        MetricsSnapshot {
            total_searches: state.total,
            successful_searches: state.successful,
            degraded_searches: state.degraded,
            unknown_strategy_searches: state.unknown_strategy,
            strategy_counts: state.strategy_counts.clone(),
            avg_latency_ms: if state.total == 0 {
                0.0
            } else {
                state.latency_total_ms / state.total as f64
            },
            avg_quality: if state.successful == 0 {
                0.0
            } else {
                state.quality_total / state.successful as f64
            },
            popular_queries: popular,
            cache_hit_rate,
            last_search_at: state.last_search_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_every_outcome() {
        let metrics = SearchMetrics::default();
        let ms = Duration::from_millis(10);
        metrics.record("combined", "config", ms, SearchOutcome::Success { top_score: Some(0.8) });
        metrics.record("combined", "config", ms, SearchOutcome::Success { top_score: None });
        metrics.record("parallel", "parser", ms, SearchOutcome::Degraded);
        metrics.record("fuzzy", "parser", ms, SearchOutcome::UnknownStrategy);

        let snap = metrics.snapshot(0.25);
        assert_eq!(snap.total_searches, 4);
        assert_eq!(snap.successful_searches, 2);
        assert_eq!(snap.degraded_searches, 1);
        assert_eq!(snap.unknown_strategy_searches, 1);
        assert_eq!(snap.strategy_counts.get("combined"), Some(&2));
        assert_eq!(snap.strategy_counts.get("fuzzy"), Some(&1));
        assert!((snap.avg_quality - 0.4).abs() < 1e-6);
        assert!((snap.avg_latency_ms - 10.0).abs() < 1.0);
        assert_eq!(snap.cache_hit_rate, 0.25);
        assert!(snap.last_search_at.is_some());
    }

    #[test]
    fn test_popular_queries_ranked_and_limited() {
        let metrics = SearchMetrics::new(2);
        let ok = SearchOutcome::Success { top_score: None };
        for q in ["b", "a", "c", "c", " a "] {
            metrics.record("combined", q, Duration::ZERO, ok);
        }
        let popular = metrics.snapshot(0.0).popular_queries;
        assert_eq!(
            popular,
            vec![
                PopularQuery { query: "a".into(), count: 2 },
                PopularQuery { query: "c".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_counters_never_decrease() {
        let metrics = SearchMetrics::default();
        let mut last = 0;
        for i in 0..20 {
            let outcome = if i % 3 == 0 {
                SearchOutcome::Degraded
            } else {
                SearchOutcome::Success { top_score: Some(0.5) }
            };
            metrics.record("text_first", "q", Duration::ZERO, outcome);
            let total = metrics.snapshot(0.0).total_searches;
            assert!(total > last);
            last = total;
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = SearchMetrics::default().snapshot(0.0);
        assert_eq!(snap.total_searches, 0);
        assert_eq!(snap.avg_latency_ms, 0.0);
        assert!(snap.popular_queries.is_empty());
        assert!(snap.last_search_at.is_none());
    }
}
