//! Hybrid vector and text retrieval for workspace code search
pub mod batch;
pub mod cache;
pub mod config;
pub mod display;
pub mod embedding;
pub mod error;
pub mod kv;
pub mod search;
pub mod text;
pub mod vector;

// Explicit exports for better API clarity
pub use batch::BatchProcessor;
pub use cache::{CacheConfig, CacheStats, SearchCache};
pub use config::Settings;
pub use embedding::{
    ContextType, EmbeddingProvider, EmbeddingRouter, FastEmbedProvider, HashEmbeddingProvider,
};
pub use error::{
    CacheError, CacheResult, EmbeddingError, EmbeddingResult, KvError, KvResult, SearchError,
    SearchResult, TextSearchError, TextSearchResult,
};
pub use kv::{KeyValueStore, MemoryStore};
pub use search::{
    HealthReport, HealthStatus, HybridMetadata, HybridSearch, HybridSearchConfig, MergedResult,
    MetricsSnapshot, ResultSource, SearchStrategy,
};
pub use text::{LexicalHit, TextSearch, WorkspaceGrep};
pub use vector::{
    Metadata, MetadataValue, SemanticHit, VectorDimension, VectorError, VectorInput, VectorRecord,
    VectorResult, VectorStore, VectorStoreConfig, VectorStoreStats,
};
