//! Hybrid retrieval: strategies, rank fusion, reranking, metrics and health.

pub mod fusion;
mod health;
mod hybrid;
mod metrics;
pub mod rerank;
mod strategy;
mod types;

pub use fusion::{DEFAULT_SEMANTIC_RATIO, merge_and_rank, resolve_ratio};
pub use health::{ComponentHealth, HealthReport, HealthStatus};
pub use hybrid::{HybridSearch, HybridSearchConfig};
pub use metrics::{MetricsSnapshot, PopularQuery, SearchMetrics, SearchOutcome};
pub use rerank::{ContextualReranker, RerankWeights};
pub use strategy::SearchStrategy;
pub use types::{HybridMetadata, META_LINE_NUMBER, MergedResult, ResultSource};
